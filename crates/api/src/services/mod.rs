//! Infrastructure services used by the HTTP layer.

pub mod square;

pub use square::SquareClient;
