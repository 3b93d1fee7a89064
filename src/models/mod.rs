mod api;
mod permissions;
mod token;
mod user;

pub use api::{
    CreateMovieRequest, DebugVarsResponse, HealthResponse, Movie, MovieEnvelope, UserEnvelope,
};
pub use permissions::Permissions;
pub use token::{Token, TokenScope, hash_plaintext};
pub use user::{Principal, PrincipalExt, User};
