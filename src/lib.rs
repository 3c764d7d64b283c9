//! Forge Scrub Library.
//!
//! Scrubber assíncrono de memória de vídeo: zera páginas liberadas pelo
//! alocador físico num engine de DMA, fora do caminho rápido de alocação.
//!
//! ```text
//!   core   ── logging (sink registrável, macros k*)
//!   klib   ── framework de self-test de boot
//!   mm     ── PhysAddr, config, erros, scrub/
//! ```

#![cfg_attr(not(test), no_std)]

// Vec/Box/Arc do ledger e das listas de registros
extern crate alloc;

pub mod core; // Logging
pub mod klib; // Self-tests
pub mod mm; // Scrubber

pub use crate::mm::addr::PhysAddr;
pub use crate::mm::error::{ScrubError, ScrubResult};
pub use crate::mm::scrub::{ScrubOwner, ScrubRecord, Scrubber, ScrubberConfig};
