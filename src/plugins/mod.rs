pub mod membership;
pub mod spam;
pub mod welcome;
