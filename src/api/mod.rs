// Thin namespace wrapper for API-layer components
pub mod handlers {
    pub use crate::handlers::*;
}

pub mod dealer_handler {
    pub use crate::dealer_handler::*;
}

pub mod routes {
    pub use crate::routes::*;
}
