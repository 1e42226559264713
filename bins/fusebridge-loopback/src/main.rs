use std::path::PathBuf;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use clap::Parser;
use fusebridge_config::{Config, ConfigError, ConfigManager};
use fusebridge_core::{ChannelConfig, ChannelError, ConnectionRegistry, MountHandle, OutArg, PeerHandle, RequestIn};
use fusebridge_logging::{init_logging, LogConfig};
use fusebridge_proto::{opcode, opcodes, InEnvelope, OutEnvelope};
use fusebridge_types::{Errno, NodeId, RequestContext};
use serde::{Deserialize, Serialize};

/// Size of the entry a LOOKUP reply carries.
const ENTRY_SIZE: usize = 40;

/// FORGET argument dropping a single lookup reference.
const FORGET_ONE: [u8; 8] = 1u64.to_le_bytes();

/// Runs a daemon and a mount over one in-process connection.
#[derive(Parser, Debug)]
#[command(name = "fusebridge-loopback", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dump default configuration and exit
    #[arg(long)]
    dump_default_config: bool,

    /// Number of concurrent LOOKUP requests to issue
    #[arg(short = 'n', long, default_value_t = 8)]
    requests: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct LoopbackConfig {
    log: LogConfig,
    channel: ChannelConfig,
}

impl Config for LoopbackConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.channel.validate()
    }

    fn hot_update(&mut self, newer: &Self) {
        self.channel.hot_update(&newer.channel);
    }
}

#[derive(Debug, Default)]
struct ServeStats {
    answered: u64,
    one_way: u64,
    stale: u64,
}

/// Answer LOOKUP with a generated entry and everything else with ENOSYS.
fn answer(request: &InEnvelope, next_node: &mut u64) -> Option<OutEnvelope> {
    let unique = request.header.unique;
    match request.header.opcode {
        opcodes::FORGET => None,
        opcodes::LOOKUP => {
            *next_node += 1;
            let mut entry = BytesMut::with_capacity(ENTRY_SIZE);
            entry.put_u64_le(*next_node); // nodeid
            entry.put_u64_le(1); // generation
            entry.put_u64_le(1); // entry_valid
            entry.put_u64_le(1); // attr_valid
            entry.put_u64_le(*next_node); // ino
            Some(OutEnvelope::reply(unique, entry.freeze()))
        }
        _ => Some(OutEnvelope::error(unique, Errno::ENOSYS)),
    }
}

async fn serve(peer: PeerHandle, buf_size: usize) -> fusebridge_core::Result<ServeStats> {
    let mut buf = vec![0u8; buf_size];
    let mut stats = ServeStats::default();
    let mut next_node = 1;
    loop {
        let n = match peer.read(&mut buf).await {
            Ok(n) => n,
            Err(ChannelError::Terminated) => break,
            Err(e) => return Err(e),
        };
        let request = InEnvelope::decode(&buf[..n])?;
        tracing::debug!(
            unique = %request.header.unique,
            opcode = opcode::name(request.header.opcode),
            nodeid = %request.header.nodeid,
            "daemon received request"
        );
        let Some(reply) = answer(&request, &mut next_node) else {
            stats.one_way += 1;
            continue;
        };
        match peer.write(&reply.encode()) {
            Ok(_) => stats.answered += 1,
            // The sender gave up; nothing to do.
            Err(ChannelError::UnknownUnique(unique)) => {
                tracing::debug!(%unique, "reply dropped");
                stats.stale += 1;
            }
            Err(e) => return Err(e),
        }
    }
    peer.release();
    Ok(stats)
}

async fn lookup(mount: Arc<MountHandle>, name: String) -> fusebridge_core::Result<u64> {
    let ctx = RequestContext::new(0, 0, std::process::id());
    let req = RequestIn::new(opcodes::LOOKUP, NodeId(1), name.clone()).with_context(ctx);
    let mut out = OutArg::with_capacity(128);
    let reply = mount.request_send(req, &mut out).await?;
    if !reply.is_ok() {
        tracing::warn!(%name, error = reply.error_name(), "lookup failed");
        return Ok(0);
    }
    let mut entry = out.data();
    let nodeid = if entry.len() >= 8 { entry.get_u64_le() } else { 0 };
    tracing::info!(%name, nodeid, len = out.len(), "lookup resolved");
    Ok(nodeid)
}

async fn run_workload(mount: Arc<MountHandle>, requests: usize) -> anyhow::Result<usize> {
    let tasks: Vec<_> = (0..requests)
        .map(|i| tokio::spawn(lookup(Arc::clone(&mount), format!("file-{}", i))))
        .collect();

    let mut resolved = 0;
    for task in tasks {
        if task.await?? != 0 {
            resolved += 1;
        }
    }

    // An opcode the daemon does not implement comes back as a status, not a
    // transport error.
    let mut out = OutArg::with_capacity(64);
    let reply = mount
        .request_send(RequestIn::new(opcodes::GETATTR, NodeId(1), Bytes::new()), &mut out)
        .await?;
    tracing::info!(error = reply.error_name(), "getattr answered");

    let forget = RequestIn::new(opcodes::FORGET, NodeId(2), Bytes::from_static(&FORGET_ONE));
    mount.send_noreply(forget).await?;

    Ok(resolved)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.dump_default_config {
        print!("{}", toml::to_string_pretty(&LoopbackConfig::default())?);
        return Ok(());
    }

    let manager = match args.config {
        Some(ref path) => ConfigManager::<LoopbackConfig>::load(path)?,
        None => ConfigManager::new(LoopbackConfig::default()),
    };
    let config = manager.snapshot();
    let _guard = init_logging(&config.log)?;

    let registry = ConnectionRegistry::new(config.channel.clone())?;
    let peer = registry.open_device();
    let mount = Arc::new(registry.mount(peer.id())?);
    tracing::info!(
        connection = %mount.id(),
        requests = args.requests,
        config = ?args.config,
        "loopback started"
    );

    let daemon = tokio::spawn(serve(peer, config.channel.max_message_size));
    let outcome = tokio::select! {
        outcome = run_workload(Arc::clone(&mount), args.requests) => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, tearing down");
            Ok(0)
        }
    };

    mount.unmount();
    let stats = daemon.await??;
    tracing::info!(
        answered = stats.answered,
        one_way = stats.one_way,
        stale = stats.stale,
        connections = registry.len(),
        "loopback finished"
    );

    let resolved = outcome?;
    if resolved != args.requests {
        anyhow::bail!("{} of {} lookups resolved", resolved, args.requests);
    }
    println!("{} lookups resolved", resolved);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusebridge_types::Unique;

    #[test]
    fn test_answer_lookup_entry() {
        let request = InEnvelope::new(
            opcodes::LOOKUP,
            Unique(4),
            NodeId(1),
            RequestContext::root(),
            Bytes::from_static(b"foo"),
        );
        let mut next_node = 1;
        let reply = answer(&request, &mut next_node).unwrap();
        assert_eq!(reply.header.unique, Unique(4));
        assert_eq!(reply.header.error, 0);
        assert_eq!(reply.payload.len(), ENTRY_SIZE);
        assert_eq!(next_node, 2);
    }

    #[test]
    fn test_answer_unsupported_and_forget() {
        let mut next_node = 1;
        let getattr = InEnvelope::new(opcodes::GETATTR, Unique(1), NodeId(1), RequestContext::root(), Bytes::new());
        let reply = answer(&getattr, &mut next_node).unwrap();
        assert_eq!(reply.header.error, -Errno::ENOSYS);

        let forget = InEnvelope::new(opcodes::FORGET, Unique(2), NodeId(1), RequestContext::root(), Bytes::new());
        assert!(answer(&forget, &mut next_node).is_none());
    }

    #[test]
    fn test_config_sections() {
        let value: toml::Value = toml::from_str(
            "[log]\nlevel = \"debug\"\n\n[channel]\nmax_outstanding = 4\n",
        )
        .unwrap();
        let config = LoopbackConfig::from_toml(&value).unwrap();
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.channel.max_outstanding, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_forget_argument() {
        assert_eq!(u64::from_le_bytes(FORGET_ONE), 1);
    }

    #[test]
    fn test_default_config_dumps() {
        let dumped = toml::to_string_pretty(&LoopbackConfig::default()).unwrap();
        assert!(dumped.contains("[channel]"));
        assert!(dumped.contains("max_outstanding = 1024"));
    }

    #[tokio::test]
    async fn test_loopback_roundtrip() {
        let registry = ConnectionRegistry::default();
        let peer = registry.open_device();
        let mount = Arc::new(registry.mount(peer.id()).unwrap());
        let daemon = tokio::spawn(serve(peer, 4096));

        let resolved = run_workload(Arc::clone(&mount), 5).await.unwrap();
        assert_eq!(resolved, 5);

        mount.unmount();
        let stats = daemon.await.unwrap().unwrap();
        assert_eq!(stats.answered, 6);
        assert_eq!(stats.one_way, 1);
        assert!(registry.is_empty());
    }
}
