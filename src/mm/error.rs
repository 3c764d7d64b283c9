//! Tipos de Erro do Scrubber
//!
//! Define erros estruturados para diagnóstico preciso de falhas de scrub.
//! Violações de invariante interna NÃO aparecem aqui: são defeitos e passam
//! por `scrub_fatal!`.

/// Erros do scrubber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrubError {
    /// Falha ao alocar a lista de saída ou o ledger
    InsufficientResources,
    /// Ledger vazio: nada para esperar
    NoWorkAvailable,
    /// O engine recusou um comando de zero-fill
    SubmissionFailed,
    /// Parâmetro inválido (page size zero, run fora do limite, etc)
    InvalidParameter,
}

impl ScrubError {
    /// Retorna descrição legível do erro
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientResources => "Recursos insuficientes para o scrub",
            Self::NoWorkAvailable => "Nenhum scrub pendente",
            Self::SubmissionFailed => "Falha ao submeter zero-fill ao engine",
            Self::InvalidParameter => "Parâmetro inválido",
        }
    }
}

impl core::fmt::Display for ScrubError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tipo Result específico para operações de scrub
pub type ScrubResult<T> = Result<T, ScrubError>;
