mod bytes;
mod capture;
mod error;
mod ethernet;
mod ip;
mod packet;
mod payload;
mod reassembly;
mod stats;
mod tcp;
#[cfg(test)]
mod testutil;


use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::ip::ProtocolNumber;
use crate::packet::{decode, Decoded, DecodeOptions};
use crate::reassembly::{DuplicatePolicy, DEFAULT_SERVER_PORT};


/// Carves the HTTP body out of one TCP flow stored in a pcap file.
#[derive(Parser)]
struct Opts {
    /// The capture file (little-endian libpcap, Ethernet).
    capture: PathBuf,

    /// Where to write the extracted payload.
    #[clap(short, long, default_value = "payload.bin")]
    output: PathBuf,

    /// Source port of the direction to reassemble.
    #[clap(short, long, default_value_t = DEFAULT_SERVER_PORT)]
    port: u16,

    /// Fail if two segments share a sequence number but not their payload.
    #[clap(long)]
    strict_duplicates: bool,

    /// Print a hex dump of the response headers.
    #[clap(long)]
    hexdump: bool,

    /// Also write logs to a file in this directory.
    #[clap(long)]
    log_dir: Option<PathBuf>,
}
impl Opts {
    fn decode_options(&self) -> DecodeOptions {
        let duplicate_policy = if self.strict_duplicates {
            DuplicatePolicy::RequireIdentical
        } else {
            DuplicatePolicy::KeepFirst
        };
        DecodeOptions {
            server_port: self.port,
            duplicate_policy,
        }
    }
}


fn hexdump(bs: &[u8]) -> String {
    let mut out = String::new();

    for (row, chunk) in bs.chunks(16).enumerate() {
        out.push_str(&format!("{:08x}  ", row * 16));
        for j in 0..16 {
            match chunk.get(j) {
                Some(b) => out.push_str(&format!("{:02x} ", b)),
                None => out.push_str("   "),
            }

            if j == 7 {
                out.push(' ');
            }
        }

        out.push_str(" |");
        for b in chunk {
            if (0x20..=0x7E).contains(b) {
                out.push(*b as char);
            } else {
                out.push('.');
            }
        }
        out.push_str("|\n");
    }

    out
}


fn setup_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = || EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, "pcap-carve.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        },
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(std::io::stderr)
                .init();
            None
        },
    }
}


fn report(decoded: &Decoded) {
    let header = &decoded.header;
    info!(
        "pcap {}.{}, snapshot length {}, time zone offset {}",
        header.major_version, header.minor_version, header.snapshot_length, header.time_zone_offset,
    );

    let summary = &decoded.summary;
    info!("{} packets, {} bytes of packet data", summary.packet_count, summary.byte_count);
    if let Some(ethertype) = summary.ethertype {
        info!("ethertype: {}", ethertype);
    }
    if let Some(protocol) = summary.ip_protocol {
        info!("IP protocol: {}", ProtocolNumber(protocol));
    }
    if let (Some(source), Some(destination)) = (summary.common_source(), summary.common_destination()) {
        info!("most frames go {} -> {}", source, destination);
    }
    for ((source, destination), count) in &summary.address_pairs {
        info!("{} -> {}: {} packets", source, destination, count);
    }
    if let (Some(first), Some(last)) = (summary.first_timestamp, summary.last_timestamp) {
        info!("captured between {} and {}", first, last);
    }

    let stats = &decoded.reassembly;
    info!(
        "{} of {} segments belong to the monitored direction; {} duplicates dropped, {} arrived out of order",
        stats.segments_matched, stats.segments_seen, stats.duplicates_dropped, stats.out_of_order,
    );
    info!("{} header bytes, {} payload bytes", decoded.headers().len(), decoded.payload().len());
}


fn run(opts: &Opts) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = std::fs::read(&opts.capture)
        .map_err(|e| format!("failed to read {}: {}", opts.capture.display(), e))?;
    info!("read {} bytes from {}", bytes.len(), opts.capture.display());

    let decoded = decode(&bytes, &opts.decode_options())?;
    report(&decoded);
    if opts.hexdump {
        print!("{}", hexdump(decoded.headers()));
    }

    std::fs::write(&opts.output, decoded.payload())
        .map_err(|e| format!("failed to write {}: {}", opts.output.display(), e))?;
    info!("wrote payload to {}", opts.output.display());
    Ok(())
}


fn main() {
    let opts = Opts::parse();
    let guard = setup_logging(opts.log_dir.as_deref());

    if let Err(e) = run(&opts) {
        error!("{}", e);
        // flush the file writer; exit() skips destructors
        drop(guard);
        std::process::exit(1);
    }
}
