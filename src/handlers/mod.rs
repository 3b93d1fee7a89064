mod fallback;
mod health;
mod movies;
mod users;

pub use fallback::{method_not_allowed, not_found};
pub use health::{debug_vars, healthcheck};
pub use movies::{create_movie, show_movie};
pub use users::show_current_user;
