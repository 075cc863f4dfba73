//! Provider implementations.

pub mod mercado_libre;
