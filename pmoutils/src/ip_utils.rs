use get_if_addrs::get_if_addrs;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Devine l'adresse IP locale de la machine.
///
/// Un socket UDP est "connecté" vers `8.8.8.8:80` (aucun paquet n'est émis),
/// puis on lit l'adresse locale choisie par le système. En cas d'échec
/// on retourne `127.0.0.1`.
///
/// # Examples
///
/// ```
/// let ip = pmoutils::guess_local_ip();
/// assert!(!ip.is_empty());
/// ```
pub fn guess_local_ip() -> String {
    guess_local_ipv4().to_string()
}

/// Variante typée de [`guess_local_ip`].
///
/// Sert aux champs qui exigent une IPv4 brute, comme `remote-ip` des
/// battements de cœur xPL.
pub fn guess_local_ipv4() -> Ipv4Addr {
    let Ok(socket) = UdpSocket::bind("0.0.0.0:0") else {
        return Ipv4Addr::LOCALHOST;
    };
    if socket.connect("8.8.8.8:80").is_err() {
        return Ipv4Addr::LOCALHOST;
    }
    match socket.local_addr().map(|a| a.ip()) {
        Ok(IpAddr::V4(ip)) => ip,
        _ => Ipv4Addr::LOCALHOST,
    }
}

/// Liste les adresses IPv4 non-loopback, regroupées par interface.
///
/// Une erreur d'énumération donne une table vide.
pub fn list_local_ipv4s() -> HashMap<String, Vec<Ipv4Addr>> {
    let mut result: HashMap<String, Vec<Ipv4Addr>> = HashMap::new();

    if let Ok(interfaces) = get_if_addrs() {
        for iface in interfaces {
            if let IpAddr::V4(ip) = iface.ip() {
                if ip.is_loopback() {
                    continue;
                }
                let entry = result.entry(iface.name).or_default();
                if !entry.contains(&ip) {
                    entry.push(ip);
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_local_ip_is_parsable_ipv4() {
        let ip = guess_local_ip();
        let parsed = ip.parse::<IpAddr>().expect("valid ip");
        assert!(parsed.is_ipv4());
    }

    #[test]
    fn test_guess_local_ipv4_matches_string_form() {
        assert_eq!(guess_local_ipv4().to_string(), guess_local_ip());
    }

    #[test]
    fn test_list_local_ipv4s_no_loopback() {
        for (name, addresses) in list_local_ipv4s() {
            assert!(!name.is_empty());
            for addr in addresses {
                assert!(!addr.is_loopback(), "{} should be filtered", addr);
            }
        }
    }

    #[test]
    fn test_list_local_ipv4s_no_duplicates() {
        for (name, addresses) in list_local_ipv4s() {
            let unique: std::collections::HashSet<_> = addresses.iter().collect();
            assert_eq!(addresses.len(), unique.len(), "duplicates on {}", name);
        }
    }
}
