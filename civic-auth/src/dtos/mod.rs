pub mod auth;

pub use auth::{
    AuthResponse, FederatedLoginRequest, LoginRequest, MessageResponse, ProfileResponse,
    RefreshRequest, RegisterRequest, UpdateProfileRequest,
};
