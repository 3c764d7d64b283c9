//! # Memory Scrubber
//!
//! Zera assincronamente páginas de vídeo devolvidas ao pool livre, sem
//! bloquear o caminho rápido do alocador. Impede que dados de uma alocação
//! vazem para a próxima.
//!
//! ## 🏗️ Arquitetura
//!
//! | Módulo     | Responsabilidade |
//! |------------|------------------|
//! | `coalesce` | Páginas contíguas → runs `(base, size)` |
//! | `ledger`   | Ring de capacidade fixa com os runs em voo |
//! | `tracker`  | Semáforo de 32 bits → contador monotônico de 64 bits |
//! | `engine`   | Fronteira com o CE / SEC2 |
//! | `ring`     | Header do ring compartilhado (GPU virtualizada) |
//! | `owner`    | Back-reference ao alocador dono do heap |
//! | `policy`   | Orçamento de polls das esperas bloqueantes |
//!
//! ## Fluxo
//!
//! ```text
//! free(pages) ──▶ submit_pages ──▶ coalesce ──▶ [ledger cheio?] ──▶ engine
//!                      │                            │ sim
//!                      │                            ▼
//!                      │                 espera + drain (backpressure)
//!                      ▼
//!                 savedList ──▶ alocador limpa o bit "scrubbing"
//!
//! alloc() sem memória ──▶ scrub_check_and_wait_for_size ──▶ records
//! ```
//!
//! ## Concorrência
//!
//! Um único `spin::Mutex` serializa TODAS as operações públicas. O lock é
//! mantido durante a submissão síncrona e durante as esperas bloqueantes
//! (busy-spin com poll do hardware a cada iteração). No máximo uma sequência
//! submit/drain por instância. IDs lógicos são atribuídos em ordem
//! estritamente crescente e o canal do engine conclui em ordem de submissão.
//!
//! Não existe cancelamento: um comando submetido sempre termina. O único
//! timeout real é o do teardown.

pub mod coalesce;
pub mod engine;
pub mod ledger;
pub mod owner;
pub mod policy;
pub mod ring;
pub mod stats;
#[cfg(any(test, feature = "self_test"))]
pub mod test;
pub mod tracker;

pub use coalesce::{coalesce_pages, ScrubRun};
pub use engine::{
    EngineKind, ScrubEngine, ScrubGpu, SemaphoreEngine, ZeroFillCommand, ZeroFillFlags,
    ZeroFillHal,
};
pub use ledger::{ScrubRecord, WorkLedger};
pub use owner::ScrubOwner;
pub use policy::{PollBudget, WaitPolicy};
pub use ring::{RingHeaderRef, ScrubRingHeader};
pub use stats::{ScrubStats, ScrubStatsSnapshot};
pub use tracker::{CompletionSource, CompletionTracker};

use crate::mm::addr::PhysAddr;
use crate::mm::config::{ScrubFlags, MAX_SCRUB_ITEMS, MAX_SCRUB_RUN_BYTES};
use crate::mm::error::{ScrubError, ScrubResult};
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

// =============================================================================
// CONFIGURAÇÃO
// =============================================================================

/// Parâmetros fixados na construção.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrubberConfig {
    pub flags: ScrubFlags,
    /// Capacidade do ledger
    pub capacity: usize,
    /// Maior run aceito pelo coalescer
    pub max_run_bytes: u64,
    /// Orçamento das esperas bloqueantes e do teardown
    pub wait: WaitPolicy,
}

impl Default for ScrubberConfig {
    fn default() -> Self {
        Self {
            flags: ScrubFlags::empty(),
            capacity: MAX_SCRUB_ITEMS,
            max_run_bytes: MAX_SCRUB_RUN_BYTES,
            wait: WaitPolicy::default(),
        }
    }
}

impl ScrubberConfig {
    pub fn with_flags(flags: ScrubFlags) -> Self {
        Self {
            flags,
            ..Self::default()
        }
    }
}

// =============================================================================
// ESTADO PROTEGIDO PELO LOCK
// =============================================================================

struct ScrubState {
    ledger: WorkLedger,
    tracker: CompletionTracker,
    engine: Box<dyn ScrubEngine>,
    ring: Option<RingHeaderRef>,
    torn_down: bool,
}

impl ScrubState {
    /// Poll não bloqueante da conclusão
    fn poll(&mut self) -> u64 {
        match self.ring {
            Some(ref ring) => self.tracker.update(ring),
            None => self.tracker.observe(self.engine.read_raw()),
        }
    }

    /// Gira até o ID `id` concluir.
    ///
    /// Com `abort_on_expiry`, desiste quando o orçamento acaba e retorna
    /// `false`. Sem ele, o estouro só é logado.
    fn spin_until(&mut self, id: u64, budget: &mut PollBudget, abort_on_expiry: bool) -> bool {
        loop {
            if self.poll() >= id {
                return true;
            }

            self.engine.service_interrupts();

            if budget.tick() {
                crate::kwarn!("(Scrub) Espera excedeu o orçamento de polls, id=", id);
            }
            if abort_on_expiry && budget.exhausted() {
                return false;
            }

            core::hint::spin_loop();
        }
    }
}

// =============================================================================
// SCRUBBER
// =============================================================================

pub struct Scrubber {
    state: Mutex<ScrubState>,
    owner: Arc<dyn ScrubOwner>,
    config: ScrubberConfig,
    stats: ScrubStats,
}

impl Scrubber {
    /// Cria o scrubber de um heap e o registra no alocador dono.
    ///
    /// Nada fica visível antes do último passo: se qualquer alocação
    /// falhar, os recursos já criados são liberados no retorno.
    pub fn construct(
        gpu: &mut dyn ScrubGpu,
        owner: Arc<dyn ScrubOwner>,
        config: ScrubberConfig,
    ) -> ScrubResult<Self> {
        crate::kinfo!("(Scrub) Construindo scrubber, capacity=", config.capacity);

        if config.max_run_bytes == 0 {
            return Err(ScrubError::InvalidParameter);
        }

        let kind = EngineKind::select(config.flags);

        let ring = if config.flags.contains(ScrubFlags::VIRTUAL_RING) {
            match gpu.virtual_ring() {
                Some(ring) => Some(ring),
                None => {
                    crate::kerror!("(Scrub) VIRTUAL_RING sem header de ring!");
                    return Err(ScrubError::InvalidParameter);
                }
            }
        } else {
            None
        };

        // O host pode já ter publicado conclusões: os IDs continuam dali
        let seed = ring.as_ref().map_or(0, |r| r.read_raw() as u64);
        if seed != 0 {
            crate::kwarn!("(Scrub) Ring virtual com valor inicial, ids após ", seed);
        }

        let ledger = WorkLedger::with_capacity_after(config.capacity, seed)?;
        let engine = gpu.create_engine(kind)?;

        if engine.kind() != kind {
            crate::kerror!("(Scrub) GPU criou engine de tipo errado!");
            return Err(ScrubError::InvalidParameter);
        }

        let scrubber = Self {
            state: Mutex::new(ScrubState {
                ledger,
                tracker: CompletionTracker::starting_at(seed),
                engine,
                ring,
                torn_down: false,
            }),
            owner,
            config,
            stats: ScrubStats::new(),
        };

        scrubber.owner.register_scrubber();
        crate::kok!("(Scrub) Scrubber registrado no alocador");
        Ok(scrubber)
    }

    /// Teardown explícito: drena tudo e devolve os registros ao alocador.
    pub fn destruct(mut self) {
        self.teardown();
    }

    /// Submete páginas liberadas para zeragem.
    ///
    /// Retorna os registros concluídos que precisaram ser drenados para abrir
    /// espaço no ledger (pode ser vazio). O chamador é dono da lista.
    ///
    /// `page_size` zero ou maior que `max_run_bytes` retorna
    /// `InvalidParameter` antes de qualquer submissão.
    pub fn submit_pages(&self, page_size: u64, pages: &[PhysAddr]) -> ScrubResult<Vec<ScrubRecord>> {
        let runs = coalesce_pages(pages, page_size, self.config.max_run_bytes)?;
        let mut saved = Vec::new();
        let mut state = self.state.lock();

        let result = self.submit_runs_with_backpressure(&mut state, &runs, &mut saved);
        drop(state);

        match result {
            Ok(()) => Ok(saved),
            Err(e) => {
                // Registros já drenados não podem se perder
                if !saved.is_empty() {
                    self.owner.clear_scrubbed_pages(&saved);
                }
                Err(e)
            }
        }
    }

    fn submit_runs_with_backpressure(
        &self,
        state: &mut ScrubState,
        runs: &[ScrubRun],
        saved: &mut Vec<ScrubRecord>,
    ) -> ScrubResult<()> {
        let mut remaining = runs;

        while remaining.len() > state.ledger.free_slots() {
            let n = remaining.len().min(state.ledger.capacity());
            let (batch, rest) = remaining.split_at(n);
            self.check_and_submit(state, batch, saved)?;
            remaining = rest;
        }

        self.submit_runs(state, remaining)
    }

    /// Espera até haver `batch.len()` slots livres, drena o que concluiu
    /// para `saved` e submete o lote.
    fn check_and_submit(
        &self,
        state: &mut ScrubState,
        batch: &[ScrubRun],
        saved: &mut Vec<ScrubRecord>,
    ) -> ScrubResult<()> {
        let free = state.ledger.free_slots();

        if batch.len() > free {
            let target = state.ledger.last_seen() + (batch.len() - free) as u64;
            crate::kdebug!("(Scrub) Ledger cheio, esperando id=", target);
            self.stats.inc_backpressure();

            let mut budget = self.config.wait.start();
            state.spin_until(target, &mut budget, false);

            let completed = state.tracker.last();
            let drained = state.ledger.drain_contiguous(completed)?;
            self.stats.add_drained(drained.len());

            if saved.is_empty() {
                *saved = drained;
            } else {
                saved
                    .try_reserve(drained.len())
                    .map_err(|_| ScrubError::InsufficientResources)?;
                saved.extend_from_slice(&drained);
            }
        }

        self.submit_runs(state, batch)
    }

    /// Submete runs que cabem no ledger.
    fn submit_runs(&self, state: &mut ScrubState, runs: &[ScrubRun]) -> ScrubResult<()> {
        let first = state.ledger.last_submitted();

        for run in runs {
            let id = state.ledger.next_id();
            state.engine.submit_zero_fill(run.base, run.size, id)?;

            if state.ledger.add_record(run.base, run.size) != Some(id) {
                crate::scrub_fatal!("(Scrub) Engine aceitou run que o ledger recusou, id=", id);
                return Err(ScrubError::SubmissionFailed);
            }
            self.stats.inc_submit(run.size);
        }

        let accepted = state.ledger.last_submitted() - first;
        if accepted != runs.len() as u64 {
            crate::scrub_fatal!("(Scrub) Submetidos != aceitos, aceitos=", accepted);
            return Err(ScrubError::SubmissionFailed);
        }

        crate::ktrace!("(Scrub) Runs submetidos=", accepted);
        Ok(())
    }

    /// Drena o que já concluiu. Nunca bloqueia.
    pub fn scrub_check(&self) -> ScrubResult<Vec<ScrubRecord>> {
        let mut state = self.state.lock();
        let completed = state.poll();
        let drained = state.ledger.drain_contiguous(completed)?;
        self.stats.add_drained(drained.len());
        Ok(drained)
    }

    /// Bloqueia até que nenhum scrub em voo toque as páginas dadas.
    ///
    /// Não drena: os registros continuam disponíveis para `scrub_check`.
    /// `page_size` inválido retorna `InvalidParameter`, como em `submit_pages`.
    pub fn scrub_wait_pages(&self, page_size: u64, pages: &[PhysAddr]) -> ScrubResult<()> {
        let runs = coalesce_pages(pages, page_size, self.config.max_run_bytes)?;
        let mut state = self.state.lock();

        for run in &runs {
            let newest = state
                .ledger
                .pending()
                .filter(|r| r.overlaps(run.base.as_u64(), run.size))
                .map(|r| r.id)
                .max();

            let Some(id) = newest else {
                continue;
            };

            if state.tracker.last() >= id {
                continue;
            }

            crate::ktrace!("(Scrub) wait_pages esperando id=", id);
            self.stats.inc_wait();
            let mut budget = self.config.wait.start();
            state.spin_until(id, &mut budget, false);
        }

        Ok(())
    }

    /// Bloqueia até haver registros concluídos cobrindo `num_pages` páginas
    /// de `page_size` e os drena, do mais antigo em diante.
    ///
    /// Ledger vazio retorna `NoWorkAvailable` em vez de bloquear para sempre.
    pub fn scrub_check_and_wait_for_size(
        &self,
        num_pages: u64,
        page_size: u64,
    ) -> ScrubResult<Vec<ScrubRecord>> {
        if page_size == 0 {
            return Err(ScrubError::InvalidParameter);
        }

        let mut state = self.state.lock();
        if state.ledger.is_empty() {
            return Err(ScrubError::NoWorkAvailable);
        }

        let mut pages = 0u64;
        let mut entries = 0u64;
        for record in state.ledger.pending() {
            if pages >= num_pages {
                break;
            }
            pages += record.size / page_size;
            entries += 1;
        }

        let target = state.ledger.last_seen() + entries;
        if state.tracker.last() < target {
            crate::kdebug!("(Scrub) wait_for_size esperando id=", target);
            self.stats.inc_wait();
            let mut budget = self.config.wait.start();
            state.spin_until(target, &mut budget, false);
        }

        let drained = state.ledger.drain_contiguous(target)?;
        self.stats.add_drained(drained.len());
        Ok(drained)
    }

    /// Comandos em voo ainda não entregues
    pub fn pending(&self) -> usize {
        self.state.lock().ledger.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    pub fn engine_kind(&self) -> EngineKind {
        self.state.lock().engine.kind()
    }

    /// Último ID concluído observado (sem poll)
    pub fn last_completed(&self) -> u64 {
        self.state.lock().tracker.last()
    }

    pub fn stats(&self) -> ScrubStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &ScrubberConfig {
        &self.config
    }

    /// Drena todo o trabalho pendente e devolve os registros ao alocador.
    ///
    /// Roda uma única vez (`destruct` ou `Drop`).
    fn teardown(&mut self) {
        let state = self.state.get_mut();
        if state.torn_down {
            return;
        }
        state.torn_down = true;

        self.owner.unregister_scrubber();
        crate::kinfo!("(Scrub) Teardown, pendentes=", state.ledger.len());

        let target = state.ledger.last_submitted();
        let mut budget = if state.engine.is_simulated() {
            PollBudget::unbounded()
        } else {
            self.config.wait.start()
        };

        if !state.spin_until(target, &mut budget, true) {
            crate::scrub_fatal!("(Scrub) Timeout drenando no teardown! last_completed=", state.tracker.last());
        }

        let completed = state.poll();
        match state.ledger.drain_contiguous(completed) {
            Ok(drained) => {
                self.stats.add_drained(drained.len());
                if !drained.is_empty() {
                    self.owner.clear_scrubbed_pages(&drained);
                }
            }
            Err(e) => {
                crate::kerror!("(Scrub) Falha no drain final do teardown!");
                crate::kerror!(e.as_str());
            }
        }

        if !state.ledger.is_empty() {
            crate::kerror!("(Scrub) Teardown com scrubs não concluídos: ", state.ledger.len());
        }
    }
}

impl Drop for Scrubber {
    fn drop(&mut self) {
        self.teardown();
    }
}
