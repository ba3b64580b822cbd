// Domain-layer modules and shared errors/models
pub mod response_generator {
    pub use crate::response_generator::*;
}

pub mod fallback {
    pub use crate::fallback::*;
}

pub mod dealers {
    pub use crate::dealers::*;
}

pub mod rate_limiter {
    pub use crate::rate_limiter::*;
}

pub mod retry {
    pub use crate::retry::*;
}

pub mod notifications {
    pub use crate::notifications::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
