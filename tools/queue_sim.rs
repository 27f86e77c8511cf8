// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Queue subsystem walkthrough on the simulated device.
//!
//! Two processes share one device: a producer creates and routes queues, a
//! consumer attaches to the routed destination and drains it.
//!
//! Usage: queue_sim [--config <path>] [--messages <n>] [--log-dir <path>] [--debug-{crate}]

use std::env;
use std::path::PathBuf;
use std::process;
use std::thread;

use anyhow::{Context, Result};
use tracing::{info, warn};

use tdt::config::{load_config, TdtConfig};
use tdt::observability::{debug_flags_help, init_logging, parse_debug_flags};
use tdt::prelude::*;
use tdt::queue::sim::SimDevice;

const PRODUCER_PID: i32 = 1;
const CONSUMER_PID: i32 = 2;

struct Args {
    config: Option<PathBuf>,
    messages: usize,
    log_dir: Option<PathBuf>,
}

fn usage_and_exit() -> ! {
    eprintln!(
        "Usage: queue_sim [--config <path>] [--messages <n>] [--log-dir <path>]\n\n{}",
        debug_flags_help()
    );
    process::exit(2);
}

fn parse_args() -> Args {
    let mut parsed = Args {
        config: None,
        messages: 3,
        log_dir: None,
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                parsed.config = Some(PathBuf::from(v));
            }
            "--messages" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                parsed.messages = v.parse().unwrap_or_else(|_| usage_and_exit());
            }
            "--log-dir" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                parsed.log_dir = Some(PathBuf::from(v));
            }
            "-h" | "--help" => usage_and_exit(),
            other if other.starts_with("--debug-") => {}
            other => {
                eprintln!("Unknown argument: {other}");
                usage_and_exit();
            }
        }
    }
    parsed
}

fn run(config: &TdtConfig, messages: usize) -> Result<()> {
    let device = SimDevice::new();
    let producer_mgr = QueueManager::from_config(device.backend(PRODUCER_PID, RunMode::Device), config)?;
    let consumer_mgr = QueueManager::from_config(device.backend(CONSUMER_PID, RunMode::Device), config)?;
    let depth = config.queue.default_depth.max(messages as u32);

    let mut source = producer_mgr.create_channel_with_depth(0, "sim_source", depth)?;
    let mut sink = producer_mgr.create_channel_with_depth(0, "sim_sink", depth)?;
    let (src_id, dst_id) = match (source.queue_id(), sink.queue_id()) {
        (Some(src), Some(dst)) => (src, dst),
        _ => anyhow::bail!("queue channels without queue ids"),
    };

    let producer = producer_mgr.processor()?;
    info!("[SIM-TOOL] Producer runs in {} mode", producer.mode());

    let mut routes: RouteList = vec![Route::new(src_id, dst_id)].into_iter().collect();
    producer.bind_routes(&mut routes)?;
    producer.grant(dst_id, CONSUMER_PID, PermissionMask::DEQUEUE, -1)?;

    for i in 0..messages {
        source.send(format!("message {i}").as_bytes(), -1)?;
    }
    info!("[SIM-TOOL] Sent {} message(s) into '{}'", messages, source.name());

    let consumer = thread::spawn(move || -> Result<usize> {
        let mut inbox = consumer_mgr.open_channel(0, "sim_sink", dst_id, 1000)?;
        let mut received = 0;
        for _ in 0..messages {
            let payload = inbox.receive(1000)?;
            info!("[SIM-TOOL] Consumer got '{}'", String::from_utf8_lossy(&payload));
            received += 1;
        }
        inbox.destroy()?;
        Ok(received)
    });
    let received = consumer
        .join()
        .map_err(|_| anyhow::anyhow!("consumer thread panicked"))??;

    let mut query_out = RouteList::new();
    let found = producer.query_routes(&RouteQuery::by_source(src_id), &mut query_out)?;
    info!("[SIM-TOOL] {} route(s) leave queue {}", found, src_id);

    if let Err(e) = source.destroy() {
        info!("[SIM-TOOL] Destroy before unbind refused as expected: {}", e);
    }
    producer.unbind_routes(&mut routes)?;
    source.destroy()?;
    sink.destroy()?;
    producer_mgr.shutdown()?;

    info!(
        "[SIM-TOOL] Done: {}/{} delivered, {} staging buffer(s) left",
        received,
        messages,
        device.live_buffers()
    );
    Ok(())
}

fn main() -> Result<()> {
    let args = parse_args();

    let config = match load_config(args.config.as_deref(), None) {
        Ok(config) => config,
        Err(e) if args.config.is_some() => return Err(e).context("loading configuration"),
        Err(_) => TdtConfig::default(),
    };

    let flags = parse_debug_flags();
    let _guard = init_logging(&flags, &config.logging.level, args.log_dir.clone())?;
    if args.config.is_none() {
        warn!("[SIM-TOOL] No --config given; using discovered or default settings");
    }

    run(&config, args.messages)
}
