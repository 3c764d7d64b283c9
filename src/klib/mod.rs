//! Kernel Library (KLib).
//!
//! Utilitários internos sem dependência de hardware.

pub mod test_framework;
