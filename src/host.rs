use pnet::datalink;
use pnet::datalink::NetworkInterface;
use std::io;
use std::net::{IpAddr, Ipv4Addr};

/// Address of the local host: the first IPv4 address its own host name resolves to.
pub fn resolve_host_address() -> io::Result<Ipv4Addr> {
    let hostname = dns_lookup::get_hostname()?;
    let addresses = dns_lookup::lookup_host(&hostname)?;
    first_ipv4(&addresses).ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, format!("no IPv4 address for host {}", hostname))
    })
}

/// First usable IPv4 address of the interface with the given index.
pub fn interface_address(interface_index: u32) -> io::Result<Ipv4Addr> {
    let interface = find_interface(interface_index)?;
    let addresses: Vec<IpAddr> = interface.ips.iter().map(|ip| ip.ip()).collect();
    first_ipv4(&addresses).ok_or(io::Error::new(
        io::ErrorKind::NotFound,
        format!("Interface {} has no IPv4 address", interface.name),
    ))
}

/// One line per interface that has an IPv4 address, ordered by index.
pub fn list_interfaces() -> Vec<String> {
    let mut interfaces = datalink::interfaces();
    interfaces.sort_by_key(|k| k.index);
    interfaces.iter()
        .filter_map(|i| {
            let ips = i.ips.iter()
                .filter(|ip| ip.is_ipv4())
                .map(|ip| ip.ip())
                .filter(|ip| !ip.is_unspecified())
                .map(|ip| ip.to_string())
                .collect::<Vec<String>>();

            if ips.is_empty() {
                None
            } else {
                Some(format!("Index: {:2}, IP: {}, Name: {}, Description: {}", i.index, ips.join(", "), i.name, i.description))
            }
        })
        .collect()
}

fn find_interface(interface_index: u32) -> io::Result<NetworkInterface> {
    datalink::interfaces().into_iter()
        .find(|i| i.index == interface_index)
        .ok_or(io::Error::new(io::ErrorKind::NotFound, format!("Could not find interface by index: {}", interface_index).as_str()))
}

fn first_ipv4(addresses: &[IpAddr]) -> Option<Ipv4Addr> {
    addresses.iter().find_map(|ip| match ip {
        IpAddr::V4(v4) if !v4.is_unspecified() => Some(*v4),
        _ => None,
    })
}
