//! Injects attack-shaped frames on an interface so each detector can be
//! exercised end to end without real hostile traffic. Needs the same
//! privileges as the capture loop (raw link-layer access).
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pnet::datalink::{self, Channel, MacAddr, NetworkInterface};

use std::net::Ipv4Addr;
use std::thread;
use std::time::Duration;

mod frames;

#[derive(Parser, Debug)]
#[clap(name = "traffic-sim", about, long_about = None)]
struct Cli {
    /// interface to inject on
    #[clap(short, long)]
    interface: String,
    /// spoofed source address
    #[clap(long, default_value = "10.66.66.66")]
    source: Ipv4Addr,
    /// delay between frames, in milliseconds
    #[clap(long, default_value_t = 10)]
    interval_ms: u64,
    #[clap(subcommand)]
    attack: Attack,
}

#[derive(Subcommand, Debug)]
enum Attack {
    /// burst of ICMP echo requests
    IcmpFlood {
        /// target address
        #[clap(long)]
        target: Ipv4Addr,
        /// frames to send
        #[clap(long, default_value_t = 200)]
        count: usize,
    },
    /// repeated SYNs to tcp/22
    SshBruteforce {
        /// target address
        #[clap(long)]
        target: Ipv4Addr,
        /// attempts to send
        #[clap(long, default_value_t = 20)]
        count: usize,
    },
    /// SYNs across a range of destination ports
    PortScan {
        /// target address
        #[clap(long)]
        target: Ipv4Addr,
        /// first port probed
        #[clap(long, default_value_t = 1000)]
        start_port: u16,
        /// how many consecutive ports to probe
        #[clap(long, default_value_t = 50)]
        ports: u16,
    },
    /// gratuitous ARP replies claiming one IP from rotating MACs
    ArpSpoof {
        /// IP to claim
        #[clap(long)]
        ip: Ipv4Addr,
        /// distinct MACs to claim it from
        #[clap(long, default_value_t = 5)]
        macs: u8,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let iface = find_interface(&cli.interface)?;
    let src_mac = iface
        .mac
        .context("interface has no MAC address")?;
    let mut tx = match datalink::channel(&iface, Default::default()) {
        Ok(Channel::Ethernet(tx, _rx)) => tx,
        Ok(_) => bail!("unsupported channel type on {}", cli.interface),
        Err(err) => return Err(err).context("failed to open injection channel"),
    };

    let pace = Duration::from_millis(cli.interval_ms);
    let mut send = |frame: Vec<u8>| -> Result<()> {
        match tx.send_to(&frame, None) {
            Some(result) => result.context("send failed")?,
            None => bail!("link closed"),
        }
        thread::sleep(pace);
        Ok(())
    };

    match cli.attack {
        Attack::IcmpFlood { target, count } => {
            println!("sending {count} echo requests {} -> {target}", cli.source);
            for seq in 0..count {
                send(frames::icmp_echo(src_mac, cli.source, target, seq as u16))?;
            }
        }
        Attack::SshBruteforce { target, count } => {
            println!("sending {count} SYNs to {target}:22 from {}", cli.source);
            for i in 0..count {
                send(frames::tcp_syn(
                    src_mac,
                    cli.source,
                    target,
                    40000 + i as u16,
                    22,
                ))?;
            }
        }
        Attack::PortScan {
            target,
            start_port,
            ports,
        } => {
            println!(
                "scanning {target} ports {start_port}..{} from {}",
                start_port.saturating_add(ports),
                cli.source
            );
            for offset in 0..ports {
                let port = start_port.saturating_add(offset);
                send(frames::tcp_syn(src_mac, cli.source, target, 43210, port))?;
            }
        }
        Attack::ArpSpoof { ip, macs } => {
            println!("claiming {ip} from {macs} different MACs");
            for i in 0..macs {
                let fake = MacAddr::new(0xde, 0xad, 0xbe, 0xef, 0x00, i);
                send(frames::arp_reply(fake, ip, ip))?;
            }
        }
    }
    println!("done");
    Ok(())
}

fn find_interface(name: &str) -> Result<NetworkInterface> {
    datalink::interfaces()
        .into_iter()
        .find(|iface| iface.name == name)
        .with_context(|| format!("interface {name} does not exist"))
}
