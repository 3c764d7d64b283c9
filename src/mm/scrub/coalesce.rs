//! # Page Coalescer
//!
//! Funde páginas fisicamente contíguas de mesmo tamanho em runs
//! `(base, size)`, para que cada run vire um único comando de zero-fill.
//!
//! ```text
//!   páginas: 0x1000 0x2000 0x3000 0x8000 0x9000
//!   runs:    [0x1000, 0x3000)        [0x8000, 0x2000)
//! ```
//!
//! Passada única, O(n). Um run nunca excede `max_run_bytes`.

use crate::mm::addr::PhysAddr;
use crate::mm::error::{ScrubError, ScrubResult};
use alloc::vec::Vec;

/// Região contígua ainda sem ID lógico.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrubRun {
    pub base: PhysAddr,
    pub size: u64,
}

/// Agrupa `pages` (todas de `page_size` bytes) em runs contíguos.
pub fn coalesce_pages(
    pages: &[PhysAddr],
    page_size: u64,
    max_run_bytes: u64,
) -> ScrubResult<Vec<ScrubRun>> {
    if page_size == 0 || page_size > max_run_bytes {
        return Err(ScrubError::InvalidParameter);
    }

    let mut runs = Vec::new();
    let Some((first, rest)) = pages.split_first() else {
        return Ok(runs);
    };

    // Pior caso: nenhuma página contígua
    runs.try_reserve_exact(pages.len())
        .map_err(|_| ScrubError::InsufficientResources)?;

    let mut current = ScrubRun {
        base: *first,
        size: page_size,
    };
    let mut previous = *first;

    for page in rest {
        let contiguous = previous.checked_add(page_size) == Some(*page);
        let fits = current.size + page_size <= max_run_bytes;

        if contiguous && fits {
            current.size += page_size;
        } else {
            runs.push(current);
            current = ScrubRun {
                base: *page,
                size: page_size,
            };
        }
        previous = *page;
    }
    runs.push(current);

    crate::ktrace!("(Scrub) Coalesce runs=", runs.len());
    Ok(runs)
}
