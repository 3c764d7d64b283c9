//! # Scrub Owner
//!
//! Back-reference para o alocador físico dono do heap. O alocador marca
//! páginas liberadas como "scrubbing" e só as devolve ao pool livre quando
//! o scrubber reporta o registro correspondente como concluído.

use super::ledger::ScrubRecord;

pub trait ScrubOwner: Send + Sync {
    /// Scrubber pronto: o alocador pode passar a submeter páginas.
    fn register_scrubber(&self) {}

    /// Primeiro passo do teardown: o alocador para de submeter.
    fn unregister_scrubber(&self) {}

    /// Devolve registros zerados que ninguém mais vai receber
    /// (teardown, ou drain interrompido por erro de submissão).
    fn clear_scrubbed_pages(&self, records: &[ScrubRecord]);
}
