// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use common::Probe;
use tessera_agents::{ResourceEvent, ResourceManager};
use tessera_core::{CacheKey, Resource, ResourceHandle, ResourceManagerConfig};

const TIMEOUT: Duration = Duration::from_secs(5);

fn async_manager() -> Result<ResourceManager> {
    let config = ResourceManagerConfig {
        async_loading: true,
        ..ResourceManagerConfig::default()
    };
    let manager = ResourceManager::new(config);
    manager.initialize()?;
    Ok(manager)
}

#[test]
fn test_async_load_completes_on_the_loader_thread() -> Result<()> {
    let manager = async_manager()?;
    assert!(manager.is_async_loading());

    let (tx, rx) = crossbeam_channel::bounded(1);
    manager.load_async::<Probe, _>("models/ship.probe", move |handle| {
        let thread_name = thread::current().name().map(str::to_string);
        let _ = tx.send((handle, thread_name));
    });

    let (handle, thread_name) = rx.recv_timeout(TIMEOUT)?;
    assert!(handle.is_loaded());
    assert_eq!(thread_name.as_deref(), Some("tessera-loader"));

    let cached = manager
        .get_resource::<Probe>("models/ship.probe")
        .context("loaded resource not cached")?;
    assert!(ResourceHandle::ptr_eq(&handle, &cached));
    Ok(())
}

#[test]
fn test_async_failure_reports_unloaded_instance_and_evicts() -> Result<()> {
    let manager = async_manager()?;

    let (tx, rx) = crossbeam_channel::bounded(1);
    manager.load_async::<Probe, _>("missing-fail.probe", move |handle| {
        let _ = tx.send(handle);
    });

    let handle = rx.recv_timeout(TIMEOUT)?;
    assert!(!handle.is_loaded());
    assert_eq!(handle.loads(), 1);
    assert!(manager.get_resource::<Probe>("missing-fail.probe").is_none());

    // A later request starts from scratch.
    let (tx, rx) = crossbeam_channel::bounded(1);
    manager.load_async::<Probe, _>("missing-fail.probe", move |handle| {
        let _ = tx.send(handle);
    });
    let retried = rx.recv_timeout(TIMEOUT)?;
    assert!(!ResourceHandle::ptr_eq(&handle, &retried));
    Ok(())
}

#[test]
fn test_load_in_async_mode_returns_before_loading() -> Result<()> {
    let (tx, rx) = crossbeam_channel::unbounded();
    let manager = ResourceManager::default().with_event_sender(tx);
    manager.set_async_loading(true)?;

    let handle = manager
        .load::<Probe>("terrain-slow.probe")
        .context("async load returned nothing")?;
    assert_eq!(handle.ref_count(), 1);
    assert!(manager.get_resource::<Probe>("terrain-slow.probe").is_some());

    let event = rx.recv_timeout(TIMEOUT)?;
    assert_eq!(
        event,
        ResourceEvent::Loaded {
            key: CacheKey::of::<Probe>("terrain-slow.probe")
        }
    );
    assert!(handle.is_loaded());
    Ok(())
}

#[test]
fn test_async_hit_invokes_callback_immediately() -> Result<()> {
    let manager = ResourceManager::default();
    let handle = manager.load::<Probe>("ui/font.probe").context("load failed")?;

    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    manager.load_async::<Probe, _>("ui/font.probe", move |hit| {
        assert!(hit.is_loaded());
        flag.store(true, Ordering::SeqCst);
    });

    assert!(called.load(Ordering::SeqCst));
    assert_eq!(handle.ref_count(), 2);
    Ok(())
}

#[test]
fn test_load_async_without_loader_completes_inline() -> Result<()> {
    let manager = ResourceManager::default();
    assert!(!manager.is_async_loading());

    let (tx, rx) = crossbeam_channel::bounded(1);
    manager.load_async::<Probe, _>("inline.probe", move |handle| {
        let _ = tx.send(handle.is_loaded());
    });
    assert!(rx.try_recv()?);
    Ok(())
}

#[test]
fn test_shutdown_with_queued_tasks_does_not_deadlock() -> Result<()> {
    // --- 1. ARRANGE ---
    let manager = async_manager()?;
    let completed = Arc::new(AtomicUsize::new(0));
    for i in 0..8 {
        let completed = Arc::clone(&completed);
        manager.load_async::<Probe, _>(&format!("queued/{i}-slow.probe"), move |_| {
            completed.fetch_add(1, Ordering::SeqCst);
        });
    }

    // --- 2. ACT ---
    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    let worker = thread::spawn(move || {
        manager.shutdown();
        let _ = done_tx.send(manager.cached_count());
    });

    // --- 3. ASSERT ---
    let remaining = done_rx
        .recv_timeout(TIMEOUT)
        .context("shutdown did not finish in time")?;
    assert_eq!(remaining, 0);
    assert!(completed.load(Ordering::SeqCst) < 8);
    worker.join().expect("shutdown thread panicked");
    Ok(())
}

#[test]
fn test_toggling_async_mode_restarts_the_loader() -> Result<()> {
    let manager = async_manager()?;
    manager.set_async_loading(false)?;
    assert!(!manager.is_async_loading());
    manager.set_async_loading(true)?;
    assert!(manager.is_async_loading());

    let (tx, rx) = crossbeam_channel::bounded(1);
    manager.load_async::<Probe, _>("again.probe", move |handle| {
        let on_loader = thread::current().name() == Some("tessera-loader");
        let _ = tx.send((handle.is_loaded(), on_loader));
    });
    assert_eq!(rx.recv_timeout(TIMEOUT)?, (true, true));
    Ok(())
}

#[test]
fn test_disabling_async_finishes_queued_tasks_inline() -> Result<()> {
    let manager = async_manager()?;
    let completed = Arc::new(AtomicUsize::new(0));
    for i in 0..3 {
        let completed = Arc::clone(&completed);
        manager.load_async::<Probe, _>(&format!("batch/{i}-slow.probe"), move |handle| {
            if handle.is_loaded() {
                completed.fetch_add(1, Ordering::SeqCst);
            }
        });
    }

    manager.set_async_loading(false)?;
    assert_eq!(completed.load(Ordering::SeqCst), 3);
    assert_eq!(manager.pending_tasks(), 0);
    assert_eq!(manager.stats().loaded, 3);
    Ok(())
}

#[test]
fn test_loader_survives_a_panicking_load() -> Result<()> {
    let manager = async_manager()?;

    let (tx, rx) = crossbeam_channel::unbounded();
    for path in ["corrupt-panic.probe", "healthy.probe"] {
        let tx = tx.clone();
        manager.load_async::<Probe, _>(path, move |handle| {
            let _ = tx.send((handle.path().to_string(), handle.is_loaded()));
        });
    }

    assert_eq!(
        rx.recv_timeout(TIMEOUT)?,
        ("corrupt-panic.probe".to_string(), false)
    );
    assert_eq!(rx.recv_timeout(TIMEOUT)?, ("healthy.probe".to_string(), true));
    assert!(manager.get_resource::<Probe>("corrupt-panic.probe").is_none());
    assert!(manager.is_async_loading());
    Ok(())
}

#[test]
fn test_concurrent_async_requests_share_one_instance() -> Result<()> {
    let manager = Arc::new(async_manager()?);
    let barrier = Arc::new(Barrier::new(3));
    let (tx, rx) = crossbeam_channel::unbounded();

    let requesters: Vec<_> = (0..3)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            let tx = tx.clone();
            thread::spawn(move || {
                barrier.wait();
                manager.load_async::<Probe, _>("shared-slow.probe", move |handle| {
                    let _ = tx.send(handle);
                });
            })
        })
        .collect();
    for requester in requesters {
        requester.join().expect("requester panicked");
    }

    let handles = (0..3)
        .map(|_| rx.recv_timeout(TIMEOUT))
        .collect::<Result<Vec<_>, _>>()?;
    for handle in &handles[1..] {
        assert!(ResourceHandle::ptr_eq(&handles[0], handle));
    }
    assert_eq!(handles[0].loads(), 1);
    assert_eq!(handles[0].ref_count(), 3);
    Ok(())
}
