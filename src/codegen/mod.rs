//! Backends. The only target is portable C11.

pub mod c;
