//! OS routing-table integration: installs one route per CIDR the roster
//! advertises, shelling out to the platform's own routing tool.

use std::process::Command;

/// Shells out to the platform's routing tool. Stateless; every call is a
/// fresh process spawn.
pub struct SysRoute;

impl SysRoute {
    pub fn new() -> Self {
        Self
    }

    /// Adds a route for each CIDR in `dsts` via `gateway`.
    pub fn add(&self, dsts: &[String], gateway: &str, interface_idx: Option<i32>) -> crate::Result<()> {
        for dst in dsts {
            self.add_route(dst, gateway, interface_idx)?;
        }
        Ok(())
    }

    /// Removes a route for each CIDR in `dsts`.
    pub fn del(&self, dsts: &[String], gateway: &str, interface_idx: Option<i32>) -> crate::Result<()> {
        for dst in dsts {
            self.del_route(dst, gateway, interface_idx)?;
        }
        Ok(())
    }

    #[cfg(target_os = "linux")]
    fn add_route(&self, dst: &str, gateway: &str, _interface_idx: Option<i32>) -> crate::Result<()> {
        let output = Command::new("ip")
            .args(["route", "add", dst, "via", gateway])
            .output()
            .map_err(|e| format!("failed to execute ip command: {}", e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("failed to add route: {}", stderr).into());
        }
        Ok(())
    }

    #[cfg(target_os = "linux")]
    fn del_route(&self, dst: &str, gateway: &str, _interface_idx: Option<i32>) -> crate::Result<()> {
        let output = Command::new("ip")
            .args(["route", "del", dst, "via", gateway])
            .output()
            .map_err(|e| format!("failed to execute ip command: {}", e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("failed to delete route: {}", stderr).into());
        }
        Ok(())
    }

    #[cfg(target_os = "macos")]
    fn add_route(&self, dst: &str, gateway: &str, _interface_idx: Option<i32>) -> crate::Result<()> {
        let output = Command::new("route")
            .args(["-n", "add", "-net", dst, gateway])
            .output()
            .map_err(|e| format!("failed to execute route command: {}", e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("failed to add route: {}", stderr).into());
        }
        Ok(())
    }

    #[cfg(target_os = "macos")]
    fn del_route(&self, dst: &str, gateway: &str, _interface_idx: Option<i32>) -> crate::Result<()> {
        let output = Command::new("route")
            .args(["-n", "delete", "-net", dst, gateway])
            .output()
            .map_err(|e| format!("failed to execute route command: {}", e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("failed to delete route: {}", stderr).into());
        }
        Ok(())
    }

    #[cfg(target_os = "windows")]
    fn add_route(&self, dst: &str, gateway: &str, interface_idx: Option<i32>) -> crate::Result<()> {
        let (network, mask) = parse_cidr(dst)?;
        let mut args = vec!["add".to_string(), network, "mask".to_string(), mask, gateway.to_string()];
        if let Some(idx) = interface_idx {
            args.push("if".to_string());
            args.push(idx.to_string());
        }
        args.push("metric".to_string());
        args.push("1".to_string());

        let output = Command::new("route")
            .args(&args)
            .output()
            .map_err(|e| format!("failed to execute route command: {}", e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("already exists") {
                return Ok(());
            }
            return Err(format!("failed to add route: {}", stderr).into());
        }
        Ok(())
    }

    #[cfg(target_os = "windows")]
    fn del_route(&self, dst: &str, _gateway: &str, _interface_idx: Option<i32>) -> crate::Result<()> {
        let (network, mask) = parse_cidr(dst)?;
        let output = Command::new("route")
            .args(["delete", &network, "mask", &mask])
            .output()
            .map_err(|e| format!("failed to execute route command: {}", e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("not found") {
                return Ok(());
            }
            return Err(format!("failed to delete route: {}", stderr).into());
        }
        Ok(())
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    fn add_route(&self, _dst: &str, _gateway: &str, _interface_idx: Option<i32>) -> crate::Result<()> {
        Err("route management is not supported on this platform".into())
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    fn del_route(&self, _dst: &str, _gateway: &str, _interface_idx: Option<i32>) -> crate::Result<()> {
        Err("route management is not supported on this platform".into())
    }
}

impl Default for SysRoute {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "windows")]
fn parse_cidr(cidr: &str) -> crate::Result<(String, String)> {
    let parts: Vec<&str> = cidr.split('/').collect();
    if parts.len() != 2 {
        return Err(format!("invalid CIDR format: {}", cidr).into());
    }
    let network = parts[0].to_string();
    let prefix_len: u8 = parts[1]
        .parse()
        .map_err(|_| format!("invalid prefix length: {}", parts[1]))?;
    Ok((network, crate::route::prefix_to_netmask(prefix_len)?))
}
