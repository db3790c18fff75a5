//! Authentication: JWT issue/verify and the REST account handlers.

pub mod handlers;
pub mod jwt;
