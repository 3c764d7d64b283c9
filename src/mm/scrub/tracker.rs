//! # Completion Tracker
//!
//! O engine escreve o payload do último comando concluído num semáforo de
//! 32 bits. Os IDs lógicos do scrubber têm 64 bits. Este módulo estende o
//! valor de hardware para um contador monotônico de 64 bits.
//!
//! ```text
//!   anterior = 0x0000_0001_FFFF_FFF0
//!   raw      =             0x0000_0010   (raw < low32 → houve wrap)
//!   novo     = 0x0000_0002_0000_0010
//! ```
//!
//! Supõe no máximo UM wrap entre dois polls. Quem chama precisa fazer poll
//! com frequência suficiente (o engine nunca tem mais de `MAX_SCRUB_ITEMS`
//! comandos em voo, muito abaixo de 2^32).

/// Fonte do valor bruto de conclusão (semáforo do engine ou ring virtual).
pub trait CompletionSource {
    /// Lê o payload de 32 bits mais recente. Não bloqueia.
    fn read_raw(&self) -> u32;
}

const LOW_MASK: u64 = 0xFFFF_FFFF;
const WRAP: u64 = 1 << 32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionTracker {
    last: u64,
}

impl CompletionTracker {
    pub const fn new() -> Self {
        Self { last: 0 }
    }

    /// Começa do valor já publicado pela fonte
    pub const fn starting_at(last: u64) -> Self {
        Self { last }
    }

    /// Último valor monotônico observado (sem poll)
    #[inline]
    pub const fn last(&self) -> u64 {
        self.last
    }

    /// Faz poll da fonte e retorna o valor monotônico atualizado.
    #[inline]
    pub fn update(&mut self, source: &dyn CompletionSource) -> u64 {
        self.observe(source.read_raw())
    }

    /// Incorpora um valor bruto de hardware.
    pub fn observe(&mut self, raw: u32) -> u64 {
        let raw = raw as u64;
        let mut value = self.last;

        if raw == value & LOW_MASK {
            return value;
        }

        if raw < value & LOW_MASK {
            value = value.wrapping_add(WRAP);
        }

        value = (value & !LOW_MASK) | raw;
        self.last = value;
        value
    }
}
