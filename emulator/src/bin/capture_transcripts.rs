use std::io;
use std::path::PathBuf;

#[allow(dead_code)]
#[path = "../host.rs"]
mod host;
#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use host::HostProperties;
use session::{Session, SessionOptions};

const TRANSCRIPT_DIR: &str = "transcripts";

fn main() -> io::Result<()> {
    record_isp_entry()?;
    record_active_low_auto_reset()?;
    record_attach_failure()?;
    Ok(())
}

fn open(name: &str, props: &[&str], refuse_line: Option<&str>) -> io::Result<Session> {
    let mut properties = HostProperties::default();
    for prop in props {
        properties.push(prop);
    }
    Session::new(SessionOptions {
        properties,
        refuse_line: refuse_line.map(str::to_string),
        transcript: Some(PathBuf::from(TRANSCRIPT_DIR).join(name)),
    })
}

fn record_isp_entry() -> io::Result<()> {
    let mut session = open("isp-entry.log", &["duration-ms=500"], None)?;
    for command in [
        "attach",
        "read isp",
        "write isp 1",
        "read isp",
        "lines",
        "write reset 1",
        "read isp",
        "trace",
        "detach",
    ] {
        session.handle_command(command)?;
    }
    Ok(())
}

fn record_active_low_auto_reset() -> io::Result<()> {
    let mut session = open(
        "active-low-auto.log",
        &["asserted-state=low", "duration-ms=200", "auto"],
        None,
    )?;
    for command in ["attach", "config", "rc status", "rc assert", "rc status", "rc deassert", "detach"] {
        session.handle_command(command)?;
    }
    Ok(())
}

fn record_attach_failure() -> io::Result<()> {
    let mut session = open("attach-failure.log", &[], Some("isp"))?;
    for command in ["attach", "lines", "read isp"] {
        session.handle_command(command)?;
    }
    Ok(())
}
