//! # Submission Engine
//!
//! Fronteira entre o scrubber e o hardware que executa o zero-fill.
//!
//! ```text
//!   Scrubber ──submit_zero_fill(base, size, id)──▶ ScrubEngine
//!       ▲                                              │
//!       │  read_raw() (payload u32)                    ▼
//!       └──────────── semáforo ◀──── release ──── ZeroFillHal (CE / SEC2)
//! ```
//!
//! O engine nunca é trocado depois da construção: CE (copy engine) no modo
//! normal, SEC2 quando confidential computing está ativo.
//!
//! A codificação dos comandos (métodos, registradores, classes) pertence ao
//! HAL externo (`ZeroFillHal`). Aqui só existe a cola: truncar o ID lógico
//! para o payload de 32 bits, validar o run e ler o semáforo.

use super::ring::RingHeaderRef;
use super::tracker::CompletionSource;
use crate::mm::addr::PhysAddr;
use crate::mm::config::{ScrubFlags, MAX_SCRUB_RUN_BYTES};
use crate::mm::error::{ScrubError, ScrubResult};
use alloc::boxed::Box;
use bitflags::bitflags;
use core::ptr::NonNull;
use volatile::VolatilePtr;

// =============================================================================
// SELEÇÃO DE BACKEND
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// Copy engine de uso geral
    CopyEngine,
    /// Co-processador seguro (confidential computing)
    Sec2,
}

impl EngineKind {
    /// Backend exigido pelas flags de construção
    pub fn select(flags: ScrubFlags) -> Self {
        if flags.contains(ScrubFlags::CONFIDENTIAL_COMPUTE) {
            Self::Sec2
        } else {
            Self::CopyEngine
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CopyEngine => "CE",
            Self::Sec2 => "SEC2",
        }
    }
}

// =============================================================================
// CONTRATO DO ENGINE
// =============================================================================

pub trait ScrubEngine: CompletionSource + Send {
    fn kind(&self) -> EngineKind;

    /// Enfileira um zero-fill assíncrono de `[base, base + size)`.
    ///
    /// O engine libera `id` (truncado a 32 bits) no semáforo quando o
    /// comando termina, em ordem de submissão.
    fn submit_zero_fill(&mut self, base: PhysAddr, size: u64, id: u64) -> ScrubResult<()>;

    /// Faz o hardware progredir (interrupções de stall/non-stall).
    /// Pode bloquear brevemente.
    fn service_interrupts(&mut self);

    /// Backend de simulação: teardown espera sem limite de polls.
    fn is_simulated(&self) -> bool {
        false
    }
}

/// Colaborador de construção: a GPU dona do heap.
pub trait ScrubGpu {
    /// Cria o canal do backend pedido.
    fn create_engine(&mut self, kind: EngineKind) -> ScrubResult<Box<dyn ScrubEngine>>;

    /// Header do ring compartilhado, quando a GPU é virtualizada.
    fn virtual_ring(&mut self) -> Option<RingHeaderRef> {
        None
    }
}

// =============================================================================
// COMANDO DE ZERO-FILL
// =============================================================================

bitflags! {
    /// Atributos do comando entregue ao HAL.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ZeroFillFlags: u32 {
        /// Destino é endereço físico de vídeo (não virtual)
        const PHYSICAL_DST      = 1 << 0;
        /// Liberar o payload no semáforo ao terminar
        const SEMAPHORE_RELEASE = 1 << 1;
        /// Pedir interrupção non-stall ao terminar
        const NOTIFY            = 1 << 2;
        /// Executar pelo caminho seguro (SEC2)
        const SECURE            = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeroFillCommand {
    pub base: PhysAddr,
    pub size: u64,
    /// ID lógico truncado ao tamanho do semáforo
    pub payload: u32,
    pub flags: ZeroFillFlags,
}

/// HAL externo: codifica e empurra comandos no canal do backend.
pub trait ZeroFillHal: Send {
    fn push_zero_fill(&mut self, cmd: &ZeroFillCommand) -> ScrubResult<()>;

    fn service_interrupts(&mut self);

    fn is_simulated(&self) -> bool {
        false
    }
}

// =============================================================================
// ENGINE COM SEMÁFORO EM MEMÓRIA
// =============================================================================

/// Adapta um `ZeroFillHal` + palavra de semáforo num `ScrubEngine`.
pub struct SemaphoreEngine<H: ZeroFillHal> {
    kind: EngineKind,
    hal: H,
    semaphore: NonNull<u32>,
}

// SAFETY: o semáforo é memória de DMA lida/escrita apenas com acessos
// voláteis, e o engine fica sempre atrás do lock do scrubber.
unsafe impl<H: ZeroFillHal> Send for SemaphoreEngine<H> {}

impl<H: ZeroFillHal> SemaphoreEngine<H> {
    /// Cria o engine e zera o semáforo.
    ///
    /// # Safety
    /// `semaphore` deve apontar para uma palavra de 32 bits válida por toda
    /// a vida do engine, escrita somente pelo backend.
    pub unsafe fn new(kind: EngineKind, hal: H, semaphore: NonNull<u32>) -> Self {
        VolatilePtr::new(semaphore).write(0);
        crate::kdebug!("(Scrub) SemaphoreEngine criado, kind=", kind as u8);
        Self {
            kind,
            hal,
            semaphore,
        }
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    fn flags(&self) -> ZeroFillFlags {
        let mut flags = ZeroFillFlags::PHYSICAL_DST
            | ZeroFillFlags::SEMAPHORE_RELEASE
            | ZeroFillFlags::NOTIFY;
        if self.kind == EngineKind::Sec2 {
            flags |= ZeroFillFlags::SECURE;
        }
        flags
    }
}

impl<H: ZeroFillHal> CompletionSource for SemaphoreEngine<H> {
    fn read_raw(&self) -> u32 {
        // SAFETY: validade garantida pelo contrato de `new`
        unsafe { VolatilePtr::new_read_only(self.semaphore) }.read()
    }
}

impl<H: ZeroFillHal> ScrubEngine for SemaphoreEngine<H> {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn submit_zero_fill(&mut self, base: PhysAddr, size: u64, id: u64) -> ScrubResult<()> {
        if size == 0 || size > MAX_SCRUB_RUN_BYTES {
            crate::kerror!("(Scrub) Run com tamanho inválido: ", size);
            return Err(ScrubError::InvalidParameter);
        }

        let cmd = ZeroFillCommand {
            base,
            size,
            payload: id as u32,
            flags: self.flags(),
        };

        self.hal.push_zero_fill(&cmd).map_err(|_| {
            crate::kerror!("(Scrub) HAL recusou zero-fill id=", id);
            ScrubError::SubmissionFailed
        })
    }

    fn service_interrupts(&mut self) {
        self.hal.service_interrupts();
    }

    fn is_simulated(&self) -> bool {
        self.hal.is_simulated()
    }
}
