//! Testes do Scrubber
//!
//! Hardware falso (`FakeHw`) atrás de um `SemaphoreEngine` real, um alocador
//! dono que só registra chamadas, e a suite de self-test de boot.
//!
//! # Uso
//! Chamar `run_scrub_tests()` depois de registrar o sink de log.

use super::engine::{EngineKind, ScrubEngine, ScrubGpu, SemaphoreEngine, ZeroFillCommand, ZeroFillHal};
use super::ledger::ScrubRecord;
use super::owner::ScrubOwner;
use super::policy::WaitPolicy;
use super::ring::{RingHeaderRef, ScrubRingHeader};
use super::{Scrubber, ScrubberConfig};
use crate::klib::test_framework::{run_test_suite, SuiteSummary, TestCase, TestResult};
use crate::mm::addr::PhysAddr;
use crate::mm::config::{ScrubFlags, PAGE_SIZE};
use crate::mm::error::{ScrubError, ScrubResult};
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use spin::Mutex;

// =============================================================================
// HARDWARE FALSO
// =============================================================================

struct HwInner {
    /// (base, size, payload) na ordem de submissão
    submitted: Vec<(u64, u64, u64)>,
    completed: u64,
    services: usize,
    latency: u32,
    ticks: u32,
    stalled: bool,
    simulated: bool,
    accept_budget: Option<u64>,
}

/// Canal que conclui um comando a cada `latency` chamadas de
/// `service_interrupts`, em ordem.
pub struct FakeHw {
    semaphore: AtomicU32,
    inner: Mutex<HwInner>,
}

impl FakeHw {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            semaphore: AtomicU32::new(0),
            inner: Mutex::new(HwInner {
                submitted: Vec::new(),
                completed: 0,
                services: 0,
                latency: 1,
                ticks: 0,
                stalled: false,
                simulated: false,
                accept_budget: None,
            }),
        })
    }

    fn semaphore_ptr(&self) -> Option<NonNull<u32>> {
        NonNull::new(self.semaphore.as_ptr())
    }

    fn publish(&self, inner: &mut HwInner, upto: u64) {
        let upto = upto.min(inner.submitted.len() as u64);
        if upto > inner.completed {
            inner.completed = upto;
            self.semaphore.store(upto as u32, Ordering::Release);
        }
    }

    pub fn complete_up_to(&self, id: u64) {
        let mut inner = self.inner.lock();
        self.publish(&mut inner, id);
    }

    pub fn complete_all(&self) {
        self.complete_up_to(u64::MAX);
    }

    pub fn completed(&self) -> u64 {
        self.inner.lock().completed
    }

    pub fn submitted(&self) -> Vec<(u64, u64, u64)> {
        self.inner.lock().submitted.clone()
    }

    pub fn services(&self) -> usize {
        self.inner.lock().services
    }

    pub fn set_stalled(&self, stalled: bool) {
        self.inner.lock().stalled = stalled;
    }

    pub fn set_simulated(&self, simulated: bool) {
        self.inner.lock().simulated = simulated;
    }

    pub fn set_service_latency(&self, latency: u32) {
        self.inner.lock().latency = latency.max(1);
    }

    /// Aceita mais `n` comandos e recusa os seguintes
    pub fn fail_after(&self, n: u64) {
        self.inner.lock().accept_budget = Some(n);
    }

    fn push(&self, cmd: &ZeroFillCommand) -> ScrubResult<()> {
        let mut inner = self.inner.lock();
        if let Some(n) = inner.accept_budget.as_mut() {
            if *n == 0 {
                return Err(ScrubError::InsufficientResources);
            }
            *n -= 1;
        }
        inner
            .submitted
            .push((cmd.base.as_u64(), cmd.size, cmd.payload as u64));
        Ok(())
    }

    fn service(&self) {
        let mut inner = self.inner.lock();
        inner.services += 1;
        if inner.stalled {
            return;
        }
        inner.ticks += 1;
        if inner.ticks >= inner.latency {
            inner.ticks = 0;
            let next = inner.completed + 1;
            self.publish(&mut inner, next);
        }
    }
}

struct FakeHal {
    hw: Arc<FakeHw>,
}

impl ZeroFillHal for FakeHal {
    fn push_zero_fill(&mut self, cmd: &ZeroFillCommand) -> ScrubResult<()> {
        self.hw.push(cmd)
    }

    fn service_interrupts(&mut self) {
        self.hw.service();
    }

    fn is_simulated(&self) -> bool {
        self.hw.inner.lock().simulated
    }
}

/// GPU falsa: cria engines sobre `FakeHw` e, opcionalmente, expõe um ring.
pub struct FakeGpu {
    hw: Arc<FakeHw>,
    ring: Option<NonNull<ScrubRingHeader>>,
    pub fail_engine: bool,
}

impl FakeGpu {
    pub fn new(hw: Arc<FakeHw>) -> Self {
        Self {
            hw,
            ring: None,
            fail_engine: false,
        }
    }

    pub fn with_ring(mut self) -> Self {
        let header = Box::into_raw(Box::new(ScrubRingHeader::default()));
        self.ring = NonNull::new(header);
        self
    }

    /// Host publica `value` em `last_sw_semaphore_done`
    pub fn publish_ring(&self, value: u32) {
        if let Some(header) = self.ring {
            // SAFETY: header alocado em `with_ring` e vivo até o drop
            unsafe {
                core::ptr::write_volatile(
                    core::ptr::addr_of_mut!((*header.as_ptr()).last_sw_semaphore_done),
                    value,
                );
            }
        }
    }
}

impl ScrubGpu for FakeGpu {
    fn create_engine(&mut self, kind: EngineKind) -> ScrubResult<Box<dyn ScrubEngine>> {
        if self.fail_engine {
            return Err(ScrubError::InsufficientResources);
        }
        let semaphore = self
            .hw
            .semaphore_ptr()
            .ok_or(ScrubError::InsufficientResources)?;
        let hal = FakeHal {
            hw: self.hw.clone(),
        };
        // SAFETY: o semáforo vive dentro do `Arc<FakeHw>` mantido pelo HAL
        let engine = unsafe { SemaphoreEngine::new(kind, hal, semaphore) };
        Ok(Box::new(engine))
    }

    fn virtual_ring(&mut self) -> Option<RingHeaderRef> {
        // SAFETY: header vive até o drop da FakeGpu
        self.ring.map(|header| unsafe { RingHeaderRef::new(header) })
    }
}

impl Drop for FakeGpu {
    fn drop(&mut self) {
        if let Some(header) = self.ring.take() {
            // SAFETY: alocado por `Box::into_raw` em `with_ring`
            drop(unsafe { Box::from_raw(header.as_ptr()) });
        }
    }
}

// =============================================================================
// ALOCADOR DONO FALSO
// =============================================================================

#[derive(Default)]
pub struct RecordingOwner {
    registered: AtomicUsize,
    unregistered: AtomicUsize,
    cleared: Mutex<Vec<ScrubRecord>>,
}

impl RecordingOwner {
    pub fn registered(&self) -> usize {
        self.registered.load(Ordering::Relaxed)
    }

    pub fn unregistered(&self) -> usize {
        self.unregistered.load(Ordering::Relaxed)
    }

    pub fn cleared(&self) -> Vec<ScrubRecord> {
        self.cleared.lock().clone()
    }
}

impl ScrubOwner for RecordingOwner {
    fn register_scrubber(&self) {
        self.registered.fetch_add(1, Ordering::Relaxed);
    }

    fn unregister_scrubber(&self) {
        self.unregistered.fetch_add(1, Ordering::Relaxed);
    }

    fn clear_scrubbed_pages(&self, records: &[ScrubRecord]) {
        self.cleared.lock().extend_from_slice(records);
    }
}

// =============================================================================
// SELF-TEST DE BOOT
// =============================================================================

/// Executa a suite do scrubber
pub fn run_scrub_tests() -> SuiteSummary {
    crate::kinfo!("╔════════════════════════════════════════╗");
    crate::kinfo!("║     🧪 TESTES DO SCRUBBER              ║");
    crate::kinfo!("╚════════════════════════════════════════╝");

    run_test_suite("scrub", SCRUB_TESTS)
}

const SCRUB_TESTS: &[TestCase] = &[
    TestCase {
        name: "coalesce de páginas contíguas",
        func: test_contiguous_single_command,
    },
    TestCase {
        name: "scrub_check não bloqueia",
        func: test_check_is_nonblocking,
    },
    TestCase {
        name: "backpressure devolve registros",
        func: test_backpressure,
    },
    TestCase {
        name: "wait_pages sem overlap",
        func: test_wait_pages_disjoint,
    },
    TestCase {
        name: "wait_for_size",
        func: test_wait_for_size,
    },
    TestCase {
        name: "destruct drena tudo",
        func: test_destruct,
    },
];

fn build(capacity: usize) -> Option<(Scrubber, Arc<FakeHw>, Arc<RecordingOwner>)> {
    let hw = FakeHw::new();
    let owner = Arc::new(RecordingOwner::default());
    let mut gpu = FakeGpu::new(hw.clone());
    let config = ScrubberConfig {
        flags: ScrubFlags::empty(),
        capacity,
        wait: WaitPolicy::UNBOUNDED,
        ..ScrubberConfig::default()
    };
    let scrubber = Scrubber::construct(&mut gpu, owner.clone(), config).ok()?;
    Some((scrubber, hw, owner))
}

fn scattered(n: u64, base: u64) -> Vec<PhysAddr> {
    (0..n).map(|i| PhysAddr::new(base + i * 2 * PAGE_SIZE)).collect()
}

fn test_contiguous_single_command() -> TestResult {
    let Some((s, hw, _owner)) = build(8) else {
        return TestResult::Failed;
    };
    let pages = [
        PhysAddr::new(0x1000),
        PhysAddr::new(0x2000),
        PhysAddr::new(0x3000),
    ];
    let Ok(saved) = s.submit_pages(PAGE_SIZE, &pages) else {
        return TestResult::Failed;
    };
    TestResult::check(saved.is_empty() && hw.submitted() == [(0x1000, 3 * PAGE_SIZE, 1)])
}

fn test_check_is_nonblocking() -> TestResult {
    let Some((s, hw, _owner)) = build(8) else {
        return TestResult::Failed;
    };
    if s.submit_pages(PAGE_SIZE, &scattered(4, 0x10_0000)).is_err() {
        return TestResult::Failed;
    }
    let before = s.scrub_check().map(|v| v.len());
    hw.complete_up_to(2);
    let after = s.scrub_check().map(|v| v.len());
    TestResult::check(before == Ok(0) && after == Ok(2) && hw.services() == 0)
}

fn test_backpressure() -> TestResult {
    let Some((s, hw, _owner)) = build(4) else {
        return TestResult::Failed;
    };
    let Ok(saved) = s.submit_pages(PAGE_SIZE, &scattered(10, 0x100_0000)) else {
        return TestResult::Failed;
    };
    hw.complete_all();
    let Ok(rest) = s.scrub_check() else {
        return TestResult::Failed;
    };
    let total = saved.len() + rest.len();
    TestResult::check(!saved.is_empty() && total == 10 && s.stats().backpressure_cycles >= 1)
}

fn test_wait_pages_disjoint() -> TestResult {
    let Some((s, hw, _owner)) = build(8) else {
        return TestResult::Failed;
    };
    if s.submit_pages(PAGE_SIZE, &scattered(2, 0x20_0000)).is_err() {
        return TestResult::Failed;
    }
    let r = s.scrub_wait_pages(PAGE_SIZE, &[PhysAddr::new(0x90_0000)]);
    TestResult::check(r.is_ok() && hw.services() == 0 && s.pending() == 2)
}

fn test_wait_for_size() -> TestResult {
    let Some((s, _hw, _owner)) = build(8) else {
        return TestResult::Failed;
    };
    if s.scrub_check_and_wait_for_size(1, PAGE_SIZE) != Err(ScrubError::NoWorkAvailable) {
        return TestResult::Failed;
    }
    if s.submit_pages(PAGE_SIZE, &scattered(3, 0x40_0000)).is_err() {
        return TestResult::Failed;
    }
    let got = s.scrub_check_and_wait_for_size(2, PAGE_SIZE);
    TestResult::check(got.map(|v| v.len()) == Ok(2) && s.pending() == 1)
}

fn test_destruct() -> TestResult {
    let Some((s, _hw, owner)) = build(8) else {
        return TestResult::Failed;
    };
    if s.submit_pages(PAGE_SIZE, &scattered(5, 0x80_0000)).is_err() {
        return TestResult::Failed;
    }
    s.destruct();
    TestResult::check(owner.unregistered() == 1 && owner.cleared().len() == 5)
}
