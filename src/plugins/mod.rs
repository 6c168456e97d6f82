pub mod httpx_probe;
pub mod nuclei_scan;
pub mod portscan_naabu;
pub mod registry;
pub mod types;
