//! # Memory Management Subsystem (MM)
//!
//! Tipos de memória física compartilhados e o scrubber de páginas de vídeo.
//!
//! ## 🏗️ Arquitetura dos Módulos
//!
//! | Módulo   | Responsabilidade |
//! |----------|------------------|
//! | `addr`   | `PhysAddr` (endereço físico tipado) |
//! | `config` | Constantes e flags de construção |
//! | `error`  | `ScrubError` / `ScrubResult` |
//! | `scrub`  | Scrubber assíncrono (ledger, tracker, engine) |
//!
//! ## Contrato com o alocador físico
//!
//! ```text
//!   pma_free ──▶ marca "scrubbing" ──▶ Scrubber::submit_pages
//!   pma_alloc ─▶ scrub_check      ──▶ limpa "scrubbing" dos registros
//!   OOM ───────▶ scrub_check_and_wait_for_size
//!   unregister ▶ Scrubber::destruct ──▶ clear_scrubbed_pages
//! ```

pub mod addr;
pub mod config;
pub mod error;
pub mod scrub;

pub use addr::PhysAddr;
pub use config::{ScrubFlags, MAX_SCRUB_ITEMS, PAGE_SIZE};
pub use error::{ScrubError, ScrubResult};
