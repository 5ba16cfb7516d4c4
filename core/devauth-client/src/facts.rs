//! Hardware and OS facts.
//!
//! Facts feed device-id derivation and the device-info report sent with
//! every heartbeat. Collection never fails: anything that cannot be read
//! on this platform is simply `None`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::env;
use std::net::IpAddr;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Facts gathered from the running machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceFacts {
    pub system: Option<String>,
    pub release: Option<String>,
    pub version: Option<String>,
    pub machine: Option<String>,
    pub processor: Option<String>,
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
    pub cpu_count: Option<u32>,
    pub cpu_freq_mhz: Option<f64>,
    pub memory_total_gb: Option<f64>,
    pub disk_id: Option<String>,
    pub disk_total_gb: Option<f64>,
    pub mac: Option<String>,
    pub username: Option<String>,
}

impl DeviceFacts {
    /// Collects facts about the current machine.
    #[must_use]
    pub fn collect() -> Self {
        let (disk_id, disk_total_gb) = match get_primary_disk() {
            Some((id, total)) => (Some(id), total),
            None => (None, None),
        };
        Self {
            system: Some(system_name().to_string()),
            release: get_os_release(),
            version: get_os_version(),
            machine: Some(machine_name()),
            processor: get_processor(),
            hostname: get_hostname(),
            ip_address: get_ip_address(),
            cpu_count: std::thread::available_parallelism()
                .ok()
                .and_then(|n| u32::try_from(n.get()).ok()),
            cpu_freq_mhz: get_cpu_freq_mhz().map(round2),
            memory_total_gb: get_memory_bytes().map(|b| round2(b as f64 / BYTES_PER_GB)),
            disk_id,
            disk_total_gb,
            mac: get_mac_address(),
            username: get_username(),
        }
    }
}

/// Builds the device-info report sent with each heartbeat.
///
/// An override is returned verbatim. Otherwise the six identity fields are
/// always present (possibly `null`) and the rest only when known.
#[must_use]
pub fn build_device_info(facts: &DeviceFacts, device_info_override: Option<Value>) -> Value {
    if let Some(info) = device_info_override {
        return info;
    }

    let mut info = Map::new();
    info.insert("hostname".into(), opt_string(&facts.hostname));
    info.insert("system".into(), opt_string(&facts.system));
    info.insert("release".into(), opt_string(&facts.release));
    info.insert("version".into(), opt_string(&facts.version));
    info.insert("machine".into(), opt_string(&facts.machine));
    info.insert("processor".into(), opt_string(&facts.processor));

    if let Some(mac) = non_empty(&facts.mac) {
        info.insert("mac_address".into(), Value::from(mac));
    }
    if let Some(ip) = non_empty(&facts.ip_address) {
        info.insert("ip_address".into(), Value::from(ip));
    }
    if let Some(cpus) = facts.cpu_count.filter(|n| *n > 0) {
        info.insert("cpu_count".into(), Value::from(cpus));
    }
    if let Some(freq) = facts.cpu_freq_mhz.filter(|f| *f > 0.0) {
        info.insert("cpu_freq_mhz".into(), Value::from(freq));
    }
    if let Some(mem) = facts.memory_total_gb.filter(|m| *m > 0.0) {
        info.insert("memory_total_gb".into(), Value::from(mem));
    }
    if let Some(disk) = facts.disk_total_gb.filter(|d| *d > 0.0) {
        info.insert("disk_total_gb".into(), Value::from(disk));
    }
    if let Some(user) = non_empty(&facts.username) {
        info.insert("username".into(), Value::from(user));
    }

    Value::Object(info)
}

fn opt_string(value: &Option<String>) -> Value {
    value.clone().map_or(Value::Null, Value::String)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Rounds to two decimal places.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// OS family name in the conventional capitalization.
fn system_name() -> &'static str {
    match env::consts::OS {
        "linux" => "Linux",
        "macos" => "Darwin",
        "windows" => "Windows",
        "freebsd" => "FreeBSD",
        other => other,
    }
}

/// Machine architecture as the platform reports it.
fn machine_name() -> String {
    let arch = env::consts::ARCH;
    #[cfg(target_os = "windows")]
    {
        match arch {
            "x86_64" => "AMD64".to_string(),
            "aarch64" => "ARM64".to_string(),
            other => other.to_string(),
        }
    }

    #[cfg(target_os = "macos")]
    {
        match arch {
            "aarch64" => "arm64".to_string(),
            other => other.to_string(),
        }
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        arch.to_string()
    }
}

fn get_hostname() -> Option<String> {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
}

fn get_username() -> Option<String> {
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .ok()
        .filter(|u| !u.is_empty())
}

fn get_ip_address() -> Option<String> {
    let ip = local_ip_address::local_ip().ok()?;
    let usable = match ip {
        IpAddr::V4(v4) => !v4.is_loopback() && !v4.is_link_local() && !v4.is_unspecified(),
        IpAddr::V6(v6) => !v6.is_loopback() && !v6.is_unspecified(),
    };
    usable.then(|| ip.to_string())
}

/// Accepts a MAC only if it is globally unique and non-zero.
fn usable_mac(mac: &str) -> Option<String> {
    let octets: Vec<u8> = mac
        .split([':', '-'])
        .map(|part| u8::from_str_radix(part, 16))
        .collect::<Result<_, _>>()
        .ok()?;
    if octets.len() != 6 || octets.iter().all(|b| *b == 0) {
        return None;
    }
    // multicast or locally administered
    if octets[0] & 0x03 != 0 {
        return None;
    }
    Some(
        octets
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(":"),
    )
}

#[cfg(target_os = "linux")]
fn read_trimmed(path: &str) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(any(target_os = "macos", target_os = "windows"))]
fn command_output(program: &str, args: &[&str]) -> Option<String> {
    std::process::Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(target_os = "linux")]
fn cpuinfo_field(name: &str) -> Option<String> {
    let content = std::fs::read_to_string("/proc/cpuinfo").ok()?;
    content.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        (key.trim() == name).then(|| value.trim().to_string())
    })
}

fn get_os_release() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        read_trimmed("/proc/sys/kernel/osrelease")
    }

    #[cfg(target_os = "macos")]
    {
        command_output("uname", &["-r"])
    }

    #[cfg(target_os = "windows")]
    {
        command_output("cmd", &["/C", "ver"]).and_then(|v| {
            v.split_whitespace()
                .last()
                .map(|s| s.trim_end_matches(']').split('.').next().unwrap_or(s).to_string())
        })
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}

fn get_os_version() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        read_trimmed("/proc/sys/kernel/version")
    }

    #[cfg(target_os = "macos")]
    {
        command_output("uname", &["-v"])
    }

    #[cfg(target_os = "windows")]
    {
        command_output("cmd", &["/C", "ver"]).and_then(|v| {
            v.split_whitespace()
                .last()
                .map(|s| s.trim_end_matches(']').to_string())
        })
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}

fn get_processor() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        cpuinfo_field("model name").or_else(|| Some(env::consts::ARCH.to_string()))
    }

    #[cfg(target_os = "macos")]
    {
        command_output("sysctl", &["-n", "machdep.cpu.brand_string"])
    }

    #[cfg(target_os = "windows")]
    {
        env::var("PROCESSOR_IDENTIFIER").ok().filter(|s| !s.is_empty())
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}

fn get_cpu_freq_mhz() -> Option<f64> {
    #[cfg(target_os = "linux")]
    {
        read_trimmed("/sys/devices/system/cpu/cpu0/cpufreq/scaling_cur_freq")
            .and_then(|khz| khz.parse::<f64>().ok())
            .map(|khz| khz / 1000.0)
            .or_else(|| cpuinfo_field("cpu MHz").and_then(|mhz| mhz.parse().ok()))
    }

    #[cfg(target_os = "macos")]
    {
        command_output("sysctl", &["-n", "hw.cpufrequency"])
            .and_then(|hz| hz.parse::<f64>().ok())
            .map(|hz| hz / 1_000_000.0)
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

fn get_memory_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let content = std::fs::read_to_string("/proc/meminfo").ok()?;
        content
            .lines()
            .find(|l| l.starts_with("MemTotal:"))
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|kb| kb.parse::<u64>().ok())
            .map(|kb| kb * 1024)
    }

    #[cfg(target_os = "macos")]
    {
        command_output("sysctl", &["-n", "hw.memsize"]).and_then(|b| b.parse().ok())
    }

    #[cfg(target_os = "windows")]
    {
        command_output(
            "powershell",
            &[
                "-NoProfile",
                "-Command",
                "(Get-CimInstance Win32_ComputerSystem).TotalPhysicalMemory",
            ],
        )
        .and_then(|b| b.parse().ok())
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}

/// Returns the first physical partition's device and its size in GB.
fn get_primary_disk() -> Option<(String, Option<f64>)> {
    #[cfg(target_os = "linux")]
    {
        let mounts = std::fs::read_to_string("/proc/mounts").ok()?;
        let (device, mountpoint) = mounts.lines().find_map(|line| {
            let mut parts = line.split_whitespace();
            let device = parts.next()?;
            let mountpoint = parts.next()?;
            device
                .starts_with("/dev/")
                .then(|| (device.to_string(), mountpoint.to_string()))
        })?;
        Some((device, filesystem_total_bytes(&mountpoint).map(to_gb)))
    }

    #[cfg(target_os = "macos")]
    {
        let total = filesystem_total_bytes("/").map(to_gb);
        let device = command_output("df", &["/"]).and_then(|out| {
            out.lines()
                .nth(1)
                .and_then(|l| l.split_whitespace().next())
                .map(String::from)
        })?;
        Some((device, total))
    }

    #[cfg(target_os = "windows")]
    {
        let drive = env::var("SystemDrive").unwrap_or_else(|_| "C:".to_string());
        Some((format!("{drive}\\"), None))
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn to_gb(bytes: u64) -> f64 {
    round2(bytes as f64 / BYTES_PER_GB)
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn filesystem_total_bytes(mountpoint: &str) -> Option<u64> {
    let path = std::ffi::CString::new(mountpoint).ok()?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: `path` is a valid C string and `stat` is a writable statvfs.
    let rc = unsafe { libc::statvfs(path.as_ptr(), &mut stat) };
    if rc != 0 {
        return None;
    }
    Some((stat.f_blocks as u64).saturating_mul(stat.f_frsize as u64))
}

fn get_mac_address() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let mut interfaces: Vec<_> = std::fs::read_dir("/sys/class/net")
            .ok()?
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name != "lo")
            .collect();
        interfaces.sort();
        interfaces
            .iter()
            .filter_map(|name| read_trimmed(&format!("/sys/class/net/{name}/address")))
            .find_map(|mac| usable_mac(&mac))
    }

    #[cfg(target_os = "macos")]
    {
        ["en0", "en1"].iter().find_map(|iface| {
            command_output("ifconfig", &[iface]).and_then(|out| {
                out.lines()
                    .map(str::trim)
                    .find_map(|l| l.strip_prefix("ether "))
                    .and_then(|mac| usable_mac(mac.trim()))
            })
        })
    }

    #[cfg(target_os = "windows")]
    {
        command_output("getmac", &["/fo", "csv", "/nh"]).and_then(|out| {
            out.lines().find_map(|line| {
                line.split(',')
                    .next()
                    .map(|field| field.trim_matches('"'))
                    .and_then(usable_mac)
            })
        })
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}
