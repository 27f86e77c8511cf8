// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Grant/attach behaviour of the three deployment modes

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::fast_settings;
use tdt_queue::sim::{SimDevice, CP_PID};
use tdt_queue::{
    DeploymentMode, DeviceId, DriverError, PeerKind, PermissionMask, Pid, Platform, QueueAttr, QueueError,
    QueueManager, QueueProcessor, RunMode,
};

fn peer_processor(device: &SimDevice, pid: Pid) -> QueueProcessor {
    QueueProcessor::new(
        DeploymentMode::SchedulerPeer,
        &device.backend(pid, RunMode::Device),
        &fast_settings(),
    )
    .unwrap()
}

#[test]
fn test_host_grant_and_attach_not_supported() {
    let device = SimDevice::new();
    let processor =
        QueueProcessor::new(DeploymentMode::Host, &device.backend(100, RunMode::Host), &fast_settings()).unwrap();
    let q = processor.create_queue(&QueueAttr::new("host_q")).unwrap();

    assert!(matches!(
        processor.grant(q, 200, PermissionMask::DEQUEUE, -1),
        Err(QueueError::NotSupported(_))
    ));
    assert!(matches!(processor.attach(q, 100), Err(QueueError::NotSupported(_))));
    assert!(device.permissions(q, 200).is_empty());
}

#[test]
fn test_control_processor_gets_full_access_on_create() {
    let device = SimDevice::new();
    let processor = QueueProcessor::new(
        DeploymentMode::ControlProcessor,
        &device.backend(100, RunMode::Device),
        &fast_settings(),
    )
    .unwrap();

    let q = processor.create_queue(&QueueAttr::new("cp_q")).unwrap();
    assert_eq!(device.permissions(q, CP_PID), PermissionMask::all());

    processor.grant(q, 200, PermissionMask::DEQUEUE, -1).unwrap();
    assert_eq!(device.permissions(q, 200), PermissionMask::DEQUEUE);
}

#[test]
fn test_control_processor_attach_regrants_peer() {
    let device = SimDevice::new();
    let owner = QueueProcessor::new(
        DeploymentMode::ControlProcessor,
        &device.backend(100, RunMode::Device),
        &fast_settings(),
    )
    .unwrap();
    let guest = QueueProcessor::new(
        DeploymentMode::ControlProcessor,
        &device.backend(200, RunMode::Device),
        &fast_settings(),
    )
    .unwrap();

    let q = owner.create_queue(&QueueAttr::new("shared")).unwrap();
    assert!(matches!(guest.attach(q, 50), Err(QueueError::Timeout { .. })));

    owner.grant(q, 200, PermissionMask::ENQUEUE | PermissionMask::DEQUEUE, -1).unwrap();
    let mask = guest.attach(q, 50).unwrap();
    assert_eq!(mask, PermissionMask::ENQUEUE | PermissionMask::DEQUEUE);
    assert_eq!(device.permissions(q, CP_PID), PermissionMask::all());
}

#[test]
fn test_group_created_when_neither_side_has_one() {
    let device = SimDevice::new();
    let grantor = peer_processor(&device, 100);
    let q = grantor.create_queue(&QueueAttr::new("g_a")).unwrap();

    grantor.grant(q, 200, PermissionMask::DEQUEUE, -1).unwrap();

    let group = device.group_of(200).expect("grantee placed in a group");
    assert_eq!(device.group_of(100), Some(group));
    assert_eq!(device.group_count(), 1);
    assert_eq!(device.permissions(q, 200), PermissionMask::DEQUEUE);

    // A second grantee joins the same group
    grantor.grant(q, 300, PermissionMask::DEQUEUE, -1).unwrap();
    assert_eq!(device.group_of(300), device.group_of(100));
    assert_eq!(device.group_count(), 1);
}

#[test]
fn test_grant_refused_when_only_grantee_has_group() {
    let device = SimDevice::new();
    device.assign_group("elsewhere", 200);
    let grantor = peer_processor(&device, 100);
    let q = grantor.create_queue(&QueueAttr::new("g_b")).unwrap();

    assert!(matches!(
        grantor.grant(q, 200, PermissionMask::DEQUEUE, -1),
        Err(QueueError::PermissionDenied(_))
    ));
    assert_eq!(device.group_of(100), None);
    assert_eq!(device.group_count(), 1);
    assert!(device.permissions(q, 200).is_empty());
}

#[test]
fn test_grant_within_shared_group_creates_nothing() {
    let device = SimDevice::new();
    device.assign_group("team", 100);
    device.assign_group("team", 200);
    let grantor = peer_processor(&device, 100);
    let q = grantor.create_queue(&QueueAttr::new("g_c")).unwrap();

    grantor.grant(q, 200, PermissionMask::ENQUEUE, -1).unwrap();
    assert_eq!(device.group_count(), 1);
    assert_eq!(device.permissions(q, 200), PermissionMask::ENQUEUE);
}

#[test]
fn test_grant_refused_across_groups() {
    let device = SimDevice::new();
    device.assign_group("left", 100);
    device.assign_group("right", 200);
    let grantor = peer_processor(&device, 100);
    let q = grantor.create_queue(&QueueAttr::new("g_d")).unwrap();

    assert!(matches!(
        grantor.grant(q, 200, PermissionMask::ENQUEUE, -1),
        Err(QueueError::PermissionDenied(_))
    ));
    assert!(device.permissions(q, 200).is_empty());
}

#[test]
fn test_group_creator_cannot_attach_but_member_can() {
    let device = SimDevice::new();
    let master = peer_processor(&device, 100);
    let member = peer_processor(&device, 200);
    let q = master.create_queue(&QueueAttr::new("g_e")).unwrap();

    master.grant(q, 200, PermissionMask::DEQUEUE, -1).unwrap();
    assert!(matches!(master.attach(q, 50), Err(QueueError::AlreadyExists(_))));
    assert_eq!(member.attach(q, 50).unwrap(), PermissionMask::DEQUEUE);
}

#[test]
fn test_manager_detects_mode_from_platform() {
    let device = SimDevice::new();

    let host = QueueManager::new(device.backend(1, RunMode::Host), fast_settings());
    assert_eq!(host.deployment_mode().unwrap(), DeploymentMode::Host);

    let cp = QueueManager::new(device.backend(2, RunMode::Device), fast_settings());
    assert_eq!(cp.deployment_mode().unwrap(), DeploymentMode::ControlProcessor);

    let peer_backend = device
        .process(3, RunMode::Device)
        .with_env("SHAREGROUP_PRECONFIG", "1")
        .into_backend();
    let peer = QueueManager::new(peer_backend, fast_settings());
    assert_eq!(peer.deployment_mode().unwrap(), DeploymentMode::SchedulerPeer);

    // Forced mode wins over the platform
    let forced = QueueManager::new(
        device.backend(4, RunMode::Device),
        fast_settings().with_force_mode(DeploymentMode::Host),
    );
    assert_eq!(forced.deployment_mode().unwrap(), DeploymentMode::Host);
}

#[test]
fn test_manager_builds_processor_once() {
    let device = SimDevice::new();
    let manager = QueueManager::new(device.backend(1, RunMode::Host), fast_settings());
    let first = manager.processor().unwrap();
    let second = manager.processor().unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
}

/// Fails the n-th group join (1-based) and delegates everything else
struct FlakyGroupPlatform {
    inner: Arc<dyn Platform>,
    fail_on: usize,
    joins: AtomicUsize,
}

impl Platform for FlakyGroupPlatform {
    fn run_mode(&self) -> Result<RunMode, DriverError> {
        self.inner.run_mode()
    }
    fn current_device(&self) -> Result<DeviceId, DriverError> {
        self.inner.current_device()
    }
    fn current_pid(&self) -> Pid {
        self.inner.current_pid()
    }
    fn peer_pid(&self, device: DeviceId, kind: PeerKind) -> Result<Pid, DriverError> {
        self.inner.peer_pid(device, kind)
    }
    fn query_group(&self, pid: Pid) -> Result<Option<String>, DriverError> {
        self.inner.query_group(pid)
    }
    fn create_group(&self, name: &str) -> Result<(), DriverError> {
        self.inner.create_group(name)
    }
    fn add_group_member(&self, name: &str, pid: Pid) -> Result<(), DriverError> {
        if self.joins.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
            return Err(DriverError::Failed { code: 9 });
        }
        self.inner.add_group_member(name, pid)
    }
    fn env_var(&self, name: &str) -> Option<String> {
        self.inner.env_var(name)
    }
}

#[test]
fn test_grant_recovers_after_failed_group_join() {
    // 1: grantee join fails, 2: grantor join fails
    for fail_on in [1, 2] {
        let device = SimDevice::new();
        let mut backend = device.backend(100, RunMode::Device);
        backend.platform = Arc::new(FlakyGroupPlatform {
            inner: backend.platform.clone(),
            fail_on,
            joins: AtomicUsize::new(0),
        });
        let grantor = QueueProcessor::new(DeploymentMode::SchedulerPeer, &backend, &fast_settings()).unwrap();
        let q = grantor.create_queue(&QueueAttr::new("g_f")).unwrap();

        assert!(grantor.grant(q, 200, PermissionMask::DEQUEUE, -1).is_err());
        assert_eq!(device.group_count(), 1);
        assert!(device.permissions(q, 200).is_empty());

        grantor.grant(q, 200, PermissionMask::DEQUEUE, -1).unwrap();
        let group = device.group_of(200).expect("grantee placed in a group");
        assert_eq!(device.group_of(100), Some(group));
        assert_eq!(device.group_count(), 1);
        assert_eq!(device.permissions(q, 200), PermissionMask::DEQUEUE);
    }
}
