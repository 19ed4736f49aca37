pub mod candidate;
pub mod decision;
pub mod recommendation;
pub mod state;

pub use candidate::*;
pub use decision::*;
pub use recommendation::*;
pub use state::*;
