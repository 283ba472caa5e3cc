use std::net::Ipv4Addr;

const HEARTBEAT_PORT: &str = "HEARTBEAT_PORT";

const DEFAULT_PORT: u16 = 8080;

pub fn get_port() -> u16 {
    let port_from_env = std::env::var(HEARTBEAT_PORT);
    port_from_env.map_or(DEFAULT_PORT, |res| res.parse().unwrap_or(DEFAULT_PORT))
}

const HEARTBEAT_ADDR: &str = "HEARTBEAT_ADDR";

const DEFAULT_ADDR: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);

pub fn get_addr() -> Ipv4Addr {
    let addr_from_env = std::env::var(HEARTBEAT_ADDR);
    addr_from_env.map_or(DEFAULT_ADDR, |res| res.parse().unwrap_or(DEFAULT_ADDR))
}

const MAX_CHART_BARS: &str = "MAX_CHART_BARS";

const DEFAULT_MAX_CHART_BARS: usize = 50;

pub fn get_max_chart_bars() -> usize {
    let bars_from_env = std::env::var(MAX_CHART_BARS);
    bars_from_env.map_or(DEFAULT_MAX_CHART_BARS, |res| {
        res.parse().unwrap_or(DEFAULT_MAX_CHART_BARS)
    })
}

const DEFAULT_SSH_PORT: u16 = 22;

pub fn get_default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}
