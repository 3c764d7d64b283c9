//! # Configuração do Scrubber
//!
//! Define constantes, feature flags e configurações do módulo de scrub.

use bitflags::bitflags;

// =============================================================================
// CONSTANTES DE TAMANHO
// =============================================================================

/// Tamanho de uma página pequena de vídeo (4 KiB)
pub const PAGE_SIZE: u64 = 4096;

// =============================================================================
// CONFIGURAÇÃO DO LEDGER
// =============================================================================

/// Capacidade padrão do ledger (comandos de scrub em voo)
pub const MAX_SCRUB_ITEMS: usize = 4096;

/// Tamanho máximo de um único comando de zero-fill.
///
/// O campo de comprimento de linha do comando de cópia tem 32 bits.
pub const MAX_SCRUB_RUN_BYTES: u64 = 0xFFFF_FFFF;

// =============================================================================
// CONFIGURAÇÃO DE ESPERA
// =============================================================================

/// Orçamento padrão de polls no teardown antes de declarar timeout
pub const DEFAULT_TEARDOWN_POLLS: u64 = 1 << 32;

// =============================================================================
// FLAGS DE CONSTRUÇÃO
// =============================================================================

bitflags! {
    /// Modos reconhecidos na construção do scrubber.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ScrubFlags: u32 {
        /// Confidential computing ativo: o zero-fill vai pelo SEC2.
        const CONFIDENTIAL_COMPUTE = 1 << 0;
        /// Conclusão lida do header do ring compartilhado (vGPU).
        const VIRTUAL_RING         = 1 << 1;
    }
}
