//! # Addr - Wrappers Type-Safe para Endereços
//!
//! O scrubber só lida com endereços físicos da memória da GPU. Nunca os
//! traduz nem os desreferencia: o zero-fill é feito pelo engine.

mod phys;

pub use phys::PhysAddr;
