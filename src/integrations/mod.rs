//! External service integrations.

pub mod llm_client {
    pub use crate::llm_client::*;
}

pub mod mailer {
    pub use crate::mailer::*;
}

pub mod auth {
    pub use crate::auth::*;
}

pub mod crypto {
    pub use crate::crypto::*;
}

pub mod history {
    pub use crate::history::*;
}

pub mod dealer_applications {
    pub use crate::dealer_applications::*;
}
