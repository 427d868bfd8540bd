use crate::snapshot::NetworkInterface;
use std::collections::BTreeMap;

#[cfg(unix)]
use std::ffi::{CStr, CString};
#[cfg(unix)]
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

#[derive(Debug, Default)]
struct IfaceEntry {
    flags: u32,
    addrs: Vec<String>,
}

/// Enumerates interfaces through `getifaddrs`. Names reported by sysinfo but
/// absent from `getifaddrs` are kept with empty flags and addresses.
#[cfg(unix)]
pub fn interfaces(known_names: &[String]) -> std::io::Result<Vec<NetworkInterface>> {
    let mut entries = read_ifaddrs()?;
    for name in known_names {
        entries.entry(name.clone()).or_default();
    }

    let mut out: Vec<NetworkInterface> = entries
        .into_iter()
        .map(|(name, entry)| NetworkInterface {
            index: interface_index(&name),
            mtu: read_mtu(&name),
            hardware_addr: read_hardware_addr(&name),
            flags: flag_names(entry.flags),
            addrs: entry.addrs,
            name,
        })
        .collect();
    out.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.name.cmp(&b.name)));
    Ok(out)
}

#[cfg(not(unix))]
pub fn interfaces(known_names: &[String]) -> std::io::Result<Vec<NetworkInterface>> {
    let entries: BTreeMap<String, IfaceEntry> = known_names
        .iter()
        .map(|name| (name.clone(), IfaceEntry::default()))
        .collect();
    Ok(entries
        .into_iter()
        .enumerate()
        .map(|(i, (name, entry))| NetworkInterface {
            index: i as u32 + 1,
            mtu: None,
            hardware_addr: None,
            flags: flag_names(entry.flags),
            addrs: entry.addrs,
            name,
        })
        .collect())
}

#[cfg(unix)]
fn read_ifaddrs() -> std::io::Result<BTreeMap<String, IfaceEntry>> {
    let mut head: *mut libc::ifaddrs = std::ptr::null_mut();
    if unsafe { libc::getifaddrs(&mut head) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    let mut out: BTreeMap<String, IfaceEntry> = BTreeMap::new();
    let mut cursor = head;
    while !cursor.is_null() {
        // SAFETY: cursor walks the list returned by getifaddrs, freed below.
        let ifa = unsafe { &*cursor };
        cursor = ifa.ifa_next;
        if ifa.ifa_name.is_null() {
            continue;
        }
        let name = unsafe { CStr::from_ptr(ifa.ifa_name) }
            .to_string_lossy()
            .into_owned();
        let entry = out.entry(name).or_default();
        entry.flags |= ifa.ifa_flags as u32;

        if let Some(addr) = unsafe { sockaddr_ip(ifa.ifa_addr) } {
            let prefix = unsafe { sockaddr_ip(ifa.ifa_netmask) }
                .map(prefix_len)
                .unwrap_or(match addr {
                    IpAddr::V4(_) => 32,
                    IpAddr::V6(_) => 128,
                });
            entry.addrs.push(format!("{addr}/{prefix}"));
        }
    }
    unsafe { libc::freeifaddrs(head) };
    Ok(out)
}

/// # Safety
/// `sa` must be null or point to a sockaddr whose family tag matches its
/// actual layout.
#[cfg(unix)]
unsafe fn sockaddr_ip(sa: *const libc::sockaddr) -> Option<IpAddr> {
    if sa.is_null() {
        return None;
    }
    match (*sa).sa_family as i32 {
        libc::AF_INET => {
            let sin = std::ptr::read_unaligned(sa as *const libc::sockaddr_in);
            Some(IpAddr::V4(Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr))))
        }
        libc::AF_INET6 => {
            let sin6 = std::ptr::read_unaligned(sa as *const libc::sockaddr_in6);
            Some(IpAddr::V6(Ipv6Addr::from(sin6.sin6_addr.s6_addr)))
        }
        _ => None,
    }
}

#[cfg(unix)]
fn interface_index(name: &str) -> u32 {
    match CString::new(name) {
        Ok(c_name) => unsafe { libc::if_nametoindex(c_name.as_ptr()) },
        Err(_) => 0,
    }
}

#[cfg(target_os = "linux")]
fn read_mtu(name: &str) -> Option<u32> {
    std::fs::read_to_string(format!("/sys/class/net/{name}/mtu"))
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

#[cfg(all(unix, not(target_os = "linux")))]
fn read_mtu(_name: &str) -> Option<u32> {
    None
}

#[cfg(target_os = "linux")]
fn read_hardware_addr(name: &str) -> Option<String> {
    let raw = std::fs::read_to_string(format!("/sys/class/net/{name}/address")).ok()?;
    normalize_hardware_addr(&raw)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn read_hardware_addr(_name: &str) -> Option<String> {
    None
}

/// Loopback and tunnel devices report an all-zero address; treat it as absent.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn normalize_hardware_addr(raw: &str) -> Option<String> {
    let addr = raw.trim().to_lowercase();
    if addr.is_empty() || addr.chars().all(|c| c == '0' || c == ':') {
        None
    } else {
        Some(addr)
    }
}

#[cfg(unix)]
fn prefix_len(mask: IpAddr) -> u8 {
    match mask {
        IpAddr::V4(m) => u32::from(m).count_ones() as u8,
        IpAddr::V6(m) => u128::from(m).count_ones() as u8,
    }
}

#[cfg(unix)]
fn flag_names(flags: u32) -> Vec<String> {
    let table = [
        (libc::IFF_UP, "up"),
        (libc::IFF_BROADCAST, "broadcast"),
        (libc::IFF_LOOPBACK, "loopback"),
        (libc::IFF_POINTOPOINT, "pointtopoint"),
        (libc::IFF_MULTICAST, "multicast"),
        (libc::IFF_RUNNING, "running"),
    ];
    table
        .iter()
        .filter(|(bit, _)| flags & (*bit as u32) != 0)
        .map(|(_, name)| name.to_string())
        .collect()
}

#[cfg(not(unix))]
fn flag_names(_flags: u32) -> Vec<String> {
    Vec::new()
}
