//! # Wait Policy
//!
//! Esperas bloqueantes do scrubber giram segurando o lock, refazendo poll
//! do hardware a cada iteração. O orçamento de polls é explícito:
//!
//! - Em esperas normais o orçamento é apenas *advisory*: ao estourar, loga
//!   uma vez e continua girando (comando submetido sempre termina).
//! - No teardown o orçamento é um timeout real: a espera é abandonada e o
//!   scrubber faz cleanup best-effort.
//!
//! Harnesses de teste com engine de latência zero usam `UNBOUNDED`.

use crate::mm::config::DEFAULT_TEARDOWN_POLLS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Polls antes de declarar timeout. `None` = sem limite.
    pub max_polls: Option<u64>,
}

impl WaitPolicy {
    pub const UNBOUNDED: Self = Self { max_polls: None };

    pub const fn with_budget(max_polls: u64) -> Self {
        Self {
            max_polls: Some(max_polls),
        }
    }

    /// Inicia a contagem de uma espera
    pub fn start(&self) -> PollBudget {
        PollBudget {
            limit: self.max_polls,
            polls: 0,
        }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::with_budget(DEFAULT_TEARDOWN_POLLS)
    }
}

/// Contador de polls de uma única espera.
#[derive(Debug)]
pub struct PollBudget {
    limit: Option<u64>,
    polls: u64,
}

impl PollBudget {
    pub const fn unbounded() -> Self {
        Self {
            limit: None,
            polls: 0,
        }
    }

    /// Conta um poll. Retorna `true` exatamente no poll que esgota o limite.
    #[inline]
    pub fn tick(&mut self) -> bool {
        self.polls = self.polls.saturating_add(1);
        self.limit == Some(self.polls)
    }

    #[inline]
    pub fn exhausted(&self) -> bool {
        matches!(self.limit, Some(limit) if self.polls >= limit)
    }

    #[inline]
    pub fn polls(&self) -> u64 {
        self.polls
    }
}
