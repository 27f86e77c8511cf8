// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Route binding, querying and the staging stores

mod common;

use common::fast_settings;
use tdt_queue::sim::SimDevice;
use tdt_queue::wire::{SubEvent, RET_OK};
use tdt_queue::{
    DeploymentMode, QueryMode, QueueAttr, QueueError, QueueId, QueueProcessor, Route, RouteList, RouteQuery, RunMode,
    StagingStore,
};

fn processor(device: &SimDevice, mode: DeploymentMode, staging: Option<StagingStore>) -> QueueProcessor {
    let run_mode = if mode == DeploymentMode::Host {
        RunMode::Host
    } else {
        RunMode::Device
    };
    let mut settings = fast_settings();
    if let Some(store) = staging {
        settings = settings.with_staging(store);
    }
    QueueProcessor::new(mode, &device.backend(100, run_mode), &settings).unwrap()
}

fn routes(pairs: &[(QueueId, QueueId)]) -> RouteList {
    pairs.iter().map(|(src, dst)| Route::new(*src, *dst)).collect()
}

#[test]
fn test_invalid_query_never_reaches_peer() {
    let device = SimDevice::new();
    let processor = processor(&device, DeploymentMode::SchedulerPeer, None);
    let mut out = RouteList::new();

    assert!(matches!(
        processor.query_routes(&RouteQuery::new(), &mut out),
        Err(QueueError::InvalidArgument(_))
    ));

    let mut missing_src = RouteQuery::new();
    missing_src.set_mode(QueryMode::BySource);
    missing_src.set_dst(QueueId(4));
    assert!(matches!(
        processor.query_routes(&missing_src, &mut out),
        Err(QueueError::InvalidArgument(_))
    ));

    let mut missing_dst = RouteQuery::new();
    missing_dst.set_mode(QueryMode::BySourceAndDestination);
    missing_dst.set_src(QueueId(4));
    assert!(matches!(
        processor.count_routes(&missing_dst),
        Err(QueueError::InvalidArgument(_))
    ));

    assert_eq!(device.control_calls(SubEvent::QueryCount), 0);
    assert_eq!(device.control_calls(SubEvent::Query), 0);
    assert!(out.is_empty());
}

#[test]
fn test_empty_result_skips_fetch() {
    let device = SimDevice::new();
    let processor = processor(&device, DeploymentMode::SchedulerPeer, None);
    let mut out = RouteList::new();

    let added = processor.query_routes(&RouteQuery::by_source(QueueId(9)), &mut out).unwrap();
    assert_eq!(added, 0);
    assert!(out.is_empty());
    assert_eq!(device.control_calls(SubEvent::QueryCount), 1);
    assert_eq!(device.control_calls(SubEvent::Query), 0);
}

#[test]
fn test_bind_then_query_each_mode() {
    let device = SimDevice::new();
    let processor = processor(&device, DeploymentMode::SchedulerPeer, None);
    let a = processor.create_queue(&QueueAttr::new("r_a")).unwrap();
    let b = processor.create_queue(&QueueAttr::new("r_b")).unwrap();
    let c = processor.create_queue(&QueueAttr::new("r_c")).unwrap();

    let mut list = routes(&[(a, b), (a, c)]);
    processor.bind_routes(&mut list).unwrap();
    assert!(list.iter().all(|r| r.status() == RET_OK));
    assert_eq!(device.route_count(), 2);

    let mut out = RouteList::new();
    assert_eq!(processor.query_routes(&RouteQuery::by_source(a), &mut out).unwrap(), 2);
    assert_eq!(device.control_calls(SubEvent::QueryCount), 1);
    assert_eq!(device.control_calls(SubEvent::Query), 1);

    let mut by_dst = RouteList::new();
    assert_eq!(processor.query_routes(&RouteQuery::by_destination(c), &mut by_dst).unwrap(), 1);
    assert_eq!(by_dst.get(0).unwrap().src(), a);
    assert_eq!(by_dst.get(0).unwrap().dst(), c);
    assert!(matches!(by_dst.get(1), Err(QueueError::InvalidArgument(_))));

    assert_eq!(processor.count_routes(&RouteQuery::between(a, b)).unwrap(), 1);
    assert_eq!(processor.count_routes(&RouteQuery::between(b, a)).unwrap(), 0);

    // Results append to what the caller already holds
    let mut appended = routes(&[(c, b)]);
    processor.query_routes(&RouteQuery::by_source(a), &mut appended).unwrap();
    assert_eq!(appended.len(), 3);

    assert_eq!(device.live_buffers(), 0);
}

#[test]
fn test_registration_happens_once() {
    let device = SimDevice::new();
    let processor = processor(&device, DeploymentMode::SchedulerPeer, None);
    let a = processor.create_queue(&QueueAttr::new("once_a")).unwrap();
    let b = processor.create_queue(&QueueAttr::new("once_b")).unwrap();
    let c = processor.create_queue(&QueueAttr::new("once_c")).unwrap();

    assert!(!processor.registry().is_connected());
    processor.bind_routes(&mut routes(&[(a, b)])).unwrap();
    processor.bind_routes(&mut routes(&[(a, c)])).unwrap();

    assert!(processor.registry().is_connected());
    assert!(device.is_registered(100));
    assert_eq!(device.control_calls(SubEvent::BindInit), 1);
    assert_eq!(device.control_calls(SubEvent::Bind), 2);
}

#[test]
fn test_rejected_bind_reports_per_route_status() {
    let device = SimDevice::new();
    let processor = processor(&device, DeploymentMode::SchedulerPeer, None);
    let a = processor.create_queue(&QueueAttr::new("st_a")).unwrap();
    let b = processor.create_queue(&QueueAttr::new("st_b")).unwrap();

    let mut list = routes(&[(a, b), (a, QueueId(4242))]);
    let result = processor.bind_routes(&mut list);

    assert!(matches!(result, Err(QueueError::RemoteRejected { .. })));
    assert_eq!(list.get(0).unwrap().status(), RET_OK);
    assert_ne!(list.get(1).unwrap().status(), RET_OK);
    assert_eq!(device.route_count(), 1);
    assert_eq!(device.live_buffers(), 0);
}

#[test]
fn test_empty_route_list_rejected() {
    let device = SimDevice::new();
    let processor = processor(&device, DeploymentMode::SchedulerPeer, None);
    assert!(matches!(
        processor.bind_routes(&mut RouteList::new()),
        Err(QueueError::InvalidArgument(_))
    ));
    assert!(matches!(
        processor.unbind_routes(&mut RouteList::new()),
        Err(QueueError::InvalidArgument(_))
    ));
    assert_eq!(device.control_calls(SubEvent::Bind), 0);
}

#[test]
fn test_unbind_reports_unknown_routes() {
    let device = SimDevice::new();
    let processor = processor(&device, DeploymentMode::SchedulerPeer, None);
    let a = processor.create_queue(&QueueAttr::new("ub_a")).unwrap();
    let b = processor.create_queue(&QueueAttr::new("ub_b")).unwrap();

    processor.bind_routes(&mut routes(&[(a, b)])).unwrap();
    let mut list = routes(&[(a, b), (b, a)]);
    assert!(processor.unbind_routes(&mut list).is_err());
    assert_eq!(list.get(0).unwrap().status(), RET_OK);
    assert_ne!(list.get(1).unwrap().status(), RET_OK);
    assert_eq!(device.route_count(), 0);
}

#[test]
fn test_control_queue_staging_round_trip() {
    let device = SimDevice::new();
    let processor = processor(&device, DeploymentMode::ControlProcessor, None);
    assert_eq!(processor.registry().profile().staging, StagingStore::ControlQueue);

    let a = processor.create_queue(&QueueAttr::new("cq_a")).unwrap();
    let b = processor.create_queue(&QueueAttr::new("cq_b")).unwrap();
    let mut list = routes(&[(a, b)]);
    processor.bind_routes(&mut list).unwrap();
    assert_eq!(list.get(0).unwrap().status(), RET_OK);

    let mut out = RouteList::new();
    assert_eq!(processor.query_routes(&RouteQuery::between(a, b), &mut out).unwrap(), 1);
    assert_eq!(out.get(0).unwrap().dst(), b);

    processor.unbind_routes(&mut routes(&[(a, b)])).unwrap();
    assert_eq!(device.route_count(), 0);
    assert_eq!(device.live_buffers(), 0);
}

#[test]
fn test_staging_override_from_settings() {
    let device = SimDevice::new();
    let processor = processor(&device, DeploymentMode::SchedulerPeer, Some(StagingStore::ControlQueue));
    assert_eq!(processor.registry().profile().staging, StagingStore::ControlQueue);

    let a = processor.create_queue(&QueueAttr::new("ov_a")).unwrap();
    let b = processor.create_queue(&QueueAttr::new("ov_b")).unwrap();
    processor.bind_routes(&mut routes(&[(a, b)])).unwrap();
    assert_eq!(device.route_count(), 1);
    assert_eq!(device.live_buffers(), 0);
}

#[test]
fn test_host_routes_go_to_control_processor() {
    let device = SimDevice::new();
    let processor = processor(&device, DeploymentMode::Host, None);
    let a = processor.create_queue(&QueueAttr::new("h_a")).unwrap();
    let b = processor.create_queue(&QueueAttr::new("h_b")).unwrap();

    processor.bind_routes(&mut routes(&[(a, b)])).unwrap();
    assert_eq!(processor.count_routes(&RouteQuery::by_source(a)).unwrap(), 1);
}
