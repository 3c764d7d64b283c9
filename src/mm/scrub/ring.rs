//! # Virtual Scrub Ring
//!
//! Em GPUs virtualizadas o host executa o zero-fill e publica o progresso
//! num header de ring em memória compartilhada com o guest:
//!
//! ```text
//! ┌──────────┬──────────┬────────────────────────┬──────────┐
//! │ put (u32)│ get (u32)│ last_sw_semaphore_done │ rsvd     │
//! └──────────┴──────────┴────────────────────────┴──────────┘
//! ```
//!
//! O scrubber só lê `last_sw_semaphore_done`. O resto do contrato é igual
//! ao do semáforo do engine.

use super::tracker::CompletionSource;
use core::ptr::NonNull;
use volatile::VolatilePtr;

/// Layout do header compartilhado
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ScrubRingHeader {
    pub put: u32,
    pub get: u32,
    pub last_sw_semaphore_done: u32,
    pub rsvd: u32,
}

/// Referência ao header mapeado.
#[derive(Debug, Clone, Copy)]
pub struct RingHeaderRef {
    header: NonNull<ScrubRingHeader>,
}

// SAFETY: o header é memória compartilhada acessada apenas com leituras
// voláteis; o host é o único escritor.
unsafe impl Send for RingHeaderRef {}

impl RingHeaderRef {
    /// # Safety
    /// `header` deve apontar para um `ScrubRingHeader` mapeado e válido por
    /// toda a vida do scrubber.
    pub const unsafe fn new(header: NonNull<ScrubRingHeader>) -> Self {
        Self { header }
    }

    fn field(&self) -> VolatilePtr<'_, u32, volatile::access::ReadOnly> {
        // SAFETY: `new` garante que o header é válido; o campo está dentro dele.
        unsafe {
            let field = core::ptr::addr_of_mut!((*self.header.as_ptr()).last_sw_semaphore_done);
            VolatilePtr::new_read_only(NonNull::new_unchecked(field))
        }
    }
}

impl CompletionSource for RingHeaderRef {
    fn read_raw(&self) -> u32 {
        self.field().read()
    }
}
