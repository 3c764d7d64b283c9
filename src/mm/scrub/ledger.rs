//! # Work Ledger
//!
//! Buffer circular de capacidade fixa com os comandos de scrub em voo.
//!
//! ```text
//!                 last_seen            last_submitted
//!                     │                      │
//!   id:   ... drenado │ id+1  id+2  ...  id+n│ livre ...
//!                     ▼                      ▼
//!   slots: [ ....... | rec | rec | ... | rec | vazio ... ]   (mod capacity)
//! ```
//!
//! O ID lógico `id` (1-based) mora no slot `(id - 1) % capacity`.
//!
//! ## Invariantes
//! - `len == last_submitted - last_seen`
//! - `0 <= len <= capacity`
//! - Slots fora da janela `(last_seen, last_submitted]` estão vazios.
//!
//! Todas as operações exigem o lock do `Scrubber`.

use crate::mm::addr::PhysAddr;
use crate::mm::error::{ScrubError, ScrubResult};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::ops::Range;

/// Um comando de zero-fill rastreado pelo scrubber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrubRecord {
    /// Base física da região zerada
    pub base: PhysAddr,
    /// Tamanho em bytes
    pub size: u64,
    /// ID lógico do comando (1-based, monotônico)
    pub id: u64,
}

impl ScrubRecord {
    /// Slot vazio
    pub const EMPTY: Self = Self {
        base: PhysAddr::new(0),
        size: 0,
        id: 0,
    };

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.id == 0 && self.size == 0 && self.base.is_null()
    }

    /// Último byte da região (inclusivo). A região pode terminar em `u64::MAX`.
    #[inline]
    pub const fn last(&self) -> u64 {
        self.base.as_u64().saturating_add(self.size.saturating_sub(1))
    }

    /// A região `[base, base + size)` intersecta esta?
    ///
    /// Compara últimos bytes inclusivos: nunca estoura no topo do espaço.
    #[inline]
    pub const fn overlaps(&self, base: u64, size: u64) -> bool {
        if size == 0 || self.size == 0 {
            return false;
        }
        let last = base.saturating_add(size - 1);
        base <= self.last() && self.base.as_u64() <= last
    }
}

pub struct WorkLedger {
    slots: Box<[ScrubRecord]>,
    last_submitted: u64,
    last_seen: u64,
    len: usize,
}

impl WorkLedger {
    /// Aloca o ledger. Falha de alocação vira `InsufficientResources`.
    pub fn with_capacity(capacity: usize) -> ScrubResult<Self> {
        Self::with_capacity_after(capacity, 0)
    }

    /// Aloca o ledger com `last_submitted == last_seen == completed`.
    ///
    /// O primeiro ID atribuído é `completed + 1`. Usado quando a fonte de
    /// conclusão já publicou um valor antes da construção.
    pub fn with_capacity_after(capacity: usize, completed: u64) -> ScrubResult<Self> {
        if capacity == 0 {
            return Err(ScrubError::InvalidParameter);
        }

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| ScrubError::InsufficientResources)?;
        slots.resize(capacity, ScrubRecord::EMPTY);

        Ok(Self {
            slots: slots.into_boxed_slice(),
            last_submitted: completed,
            last_seen: completed,
            len: 0,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Comandos em voo (ainda não entregues ao cliente)
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn free_slots(&self) -> usize {
        self.capacity() - self.len
    }

    #[inline]
    pub fn last_submitted(&self) -> u64 {
        self.last_submitted
    }

    #[inline]
    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }

    /// ID que o próximo `add_record` vai atribuir
    #[inline]
    pub fn next_id(&self) -> u64 {
        self.last_submitted + 1
    }

    #[inline]
    fn slot_of(&self, id: u64) -> usize {
        ((id - 1) % self.capacity() as u64) as usize
    }

    /// Spans físicos dos `count` registros mais antigos ainda não vistos.
    fn spans(&self, count: usize) -> (Range<usize>, Range<usize>) {
        let cap = self.capacity();
        let start = (self.last_seen % cap as u64) as usize;
        let head_len = count.min(cap - start);
        (start..start + head_len, 0..count - head_len)
    }

    /// Registra um comando já aceito pelo engine.
    ///
    /// Retorna o ID atribuído, ou `None` se o ledger violou uma invariante
    /// (cheio, ou slot de destino ocupado).
    pub fn add_record(&mut self, base: PhysAddr, size: u64) -> Option<u64> {
        if self.free_slots() == 0 {
            crate::scrub_fatal!("(Scrub) add_record com ledger cheio! last_submitted=", self.last_submitted);
            return None;
        }

        let id = self.next_id();
        let slot = self.slot_of(id);

        if !self.slots[slot].is_empty() {
            crate::scrub_fatal!("(Scrub) Slot do ledger ocupado! slot=", slot);
            return None;
        }

        self.slots[slot] = ScrubRecord { base, size, id };
        self.last_submitted = id;
        self.len += 1;

        crate::ktrace!("(Scrub) Ledger add id=", id);
        Some(id)
    }

    /// Entrega todos os registros com ID `<= completed` ainda não vistos.
    ///
    /// Sem trabalho concluído retorna um `Vec` vazio (sem alocação).
    pub fn drain_contiguous(&mut self, completed: u64) -> ScrubResult<Vec<ScrubRecord>> {
        let mut completed = completed;
        if completed > self.last_submitted {
            crate::scrub_fatal!("(Scrub) Conclusão além do último submetido! completed=", completed);
            completed = self.last_submitted;
        }

        if completed <= self.last_seen {
            return Ok(Vec::new());
        }

        let count = (completed - self.last_seen) as usize;
        let mut out = Vec::new();
        out.try_reserve_exact(count)
            .map_err(|_| ScrubError::InsufficientResources)?;

        let (head, tail) = self.spans(count);
        out.extend_from_slice(&self.slots[head.clone()]);
        out.extend_from_slice(&self.slots[tail.clone()]);
        self.slots[head].fill(ScrubRecord::EMPTY);
        self.slots[tail].fill(ScrubRecord::EMPTY);

        self.last_seen = completed;
        self.len -= count;

        crate::ktrace!("(Scrub) Ledger drain count=", count);
        Ok(out)
    }

    /// Registros em voo, do mais antigo para o mais novo.
    pub fn pending(&self) -> impl Iterator<Item = &ScrubRecord> + '_ {
        let (head, tail) = self.spans(self.len);
        self.slots[head].iter().chain(self.slots[tail].iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariants(l: &WorkLedger) {
        assert_eq!(l.len() as u64, l.last_submitted() - l.last_seen());
        assert!(l.len() <= l.capacity());
        assert!(l.last_seen() <= l.last_submitted());
        assert_eq!(l.pending().count(), l.len());
    }

    fn page(n: u64) -> PhysAddr {
        PhysAddr::new(n * 0x1000)
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert_eq!(
            WorkLedger::with_capacity(0).err(),
            Some(ScrubError::InvalidParameter)
        );
    }

    #[test]
    fn ids_are_one_based_and_sequential() {
        let mut l = WorkLedger::with_capacity(4).unwrap();
        assert_eq!(l.add_record(page(1), 0x1000), Some(1));
        assert_eq!(l.add_record(page(2), 0x1000), Some(2));
        assert_eq!(l.next_id(), 3);
        assert_eq!(l.free_slots(), 2);
        assert_invariants(&l);
    }

    #[test]
    fn drain_nothing_completed_returns_empty() {
        let mut l = WorkLedger::with_capacity(4).unwrap();
        l.add_record(page(1), 0x1000);
        let out = l.drain_contiguous(0).unwrap();
        assert!(out.is_empty());
        assert_eq!(out.capacity(), 0);
        assert_eq!(l.len(), 1);
    }

    #[test]
    fn drain_is_partial_and_ordered() {
        let mut l = WorkLedger::with_capacity(8).unwrap();
        for i in 1..=5 {
            l.add_record(page(i), 0x1000);
        }
        let out = l.drain_contiguous(3).unwrap();
        let ids: Vec<u64> = out.iter().map(|r| r.id).collect();
        assert_eq!(ids, [1, 2, 3]);
        assert_eq!(out[0].base, page(1));
        assert_eq!(l.last_seen(), 3);
        assert_eq!(l.len(), 2);
        assert_invariants(&l);

        // Drain repetido do mesmo ponto não devolve nada
        assert!(l.drain_contiguous(3).unwrap().is_empty());
    }

    #[test]
    fn drain_splits_across_the_physical_end() {
        let mut l = WorkLedger::with_capacity(4).unwrap();
        for i in 1..=3 {
            l.add_record(page(i), 0x1000);
        }
        l.drain_contiguous(3).unwrap();

        // ids 4..=7 ocupam slots 3, 0, 1, 2
        for i in 4..=7 {
            assert_eq!(l.add_record(page(i), 0x1000), Some(i));
        }
        assert_eq!(l.free_slots(), 0);
        assert_invariants(&l);

        let pending: Vec<u64> = l.pending().map(|r| r.id).collect();
        assert_eq!(pending, [4, 5, 6, 7]);

        let out = l.drain_contiguous(7).unwrap();
        let ids: Vec<u64> = out.iter().map(|r| r.id).collect();
        assert_eq!(ids, [4, 5, 6, 7]);
        assert!(l.is_empty());
        assert!(l.slots.iter().all(ScrubRecord::is_empty));
        assert_invariants(&l);
    }

    #[test]
    fn invariants_hold_over_many_cycles() {
        let mut l = WorkLedger::with_capacity(5).unwrap();
        let mut next_page = 0;
        for round in 0..50u64 {
            while l.free_slots() > 0 {
                next_page += 1;
                l.add_record(page(next_page), 0x1000).unwrap();
                assert_invariants(&l);
            }
            let target = l.last_seen() + 1 + round % 5;
            let out = l.drain_contiguous(target.min(l.last_submitted())).unwrap();
            assert!(!out.is_empty());
            for w in out.windows(2) {
                assert_eq!(w[0].id + 1, w[1].id);
            }
            assert_invariants(&l);
        }
    }

    #[test]
    fn seeded_ledger_continues_after_completed() {
        let mut l = WorkLedger::with_capacity_after(4, 7).unwrap();
        assert!(l.is_empty());
        assert_eq!(l.next_id(), 8);
        for i in 8..=11 {
            assert_eq!(l.add_record(page(i), 0x1000), Some(i));
        }
        assert_invariants(&l);
        assert!(l.drain_contiguous(7).unwrap().is_empty());

        let ids: Vec<u64> = l.drain_contiguous(10).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, [8, 9, 10]);
        let pending: Vec<u64> = l.pending().map(|r| r.id).collect();
        assert_eq!(pending, [11]);
        assert_invariants(&l);
    }

    #[test]
    fn overlap_is_half_open() {
        let r = ScrubRecord {
            base: PhysAddr::new(0x2000),
            size: 0x2000,
            id: 1,
        };
        assert!(r.overlaps(0x3000, 0x1000));
        assert!(r.overlaps(0x1000, 0x2000));
        assert!(!r.overlaps(0x4000, 0x1000));
        assert!(!r.overlaps(0x1000, 0x1000));
        assert!(!r.overlaps(0x3000, 0));
    }

    #[test]
    fn overlap_at_top_of_address_space() {
        let top = u64::MAX - 0xFFF;
        let r = ScrubRecord {
            base: PhysAddr::new(top),
            size: 0x1000,
            id: 1,
        };
        assert_eq!(r.last(), u64::MAX);
        assert!(r.overlaps(top, 0x1000));
        assert!(r.overlaps(u64::MAX, 1));
        assert!(!r.overlaps(top - 0x1000, 0x1000));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn add_on_full_ledger_is_fatal() {
        let mut l = WorkLedger::with_capacity(1).unwrap();
        l.add_record(page(1), 0x1000);
        l.add_record(page(2), 0x1000);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn completion_past_last_submitted_is_fatal() {
        let mut l = WorkLedger::with_capacity(2).unwrap();
        l.add_record(page(1), 0x1000);
        let _ = l.drain_contiguous(2);
    }
}
