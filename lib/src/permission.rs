// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::{Error, Result};
use nix::unistd::{Gid, Group, Uid, User};
use std::fmt;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

/// The hardware interface a device file belongs to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Interface {
    Gpio,
    I2c,
    Spi,
}

impl Interface {
    /// The groups that may own device files of this interface.
    pub fn groups(&self) -> &'static [&'static str] {
        match self {
            Interface::Gpio => &["gpio", "dialout"],
            Interface::I2c => &["i2c"],
            Interface::Spi => &["spi"],
        }
    }

    fn group_list(&self) -> String {
        self.groups()
            .iter()
            .map(|g| format!("'{g}'"))
            .collect::<Vec<_>>()
            .join(" or ")
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interface::Gpio => write!(f, "gpio"),
            Interface::I2c => write!(f, "i2c"),
            Interface::Spi => write!(f, "spi"),
        }
    }
}

/// The user the process is running as.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Identity {
    pub user: String,
    pub uid: u32,
    /// The names of the groups the user belongs to.
    pub groups: Vec<String>,
    /// True if the process was started by sudo.
    pub sudo: bool,
}

impl Identity {
    pub fn current() -> Identity {
        let uid = Uid::current();
        let user = User::from_uid(uid)
            .ok()
            .flatten()
            .map(|u| u.name)
            .unwrap_or_else(|| uid.to_string());
        let mut gids = nix::unistd::getgroups().unwrap_or_default();
        gids.push(Gid::current());
        let mut groups: Vec<String> = gids.into_iter().map(group_name).collect();
        groups.sort();
        groups.dedup();
        Identity {
            user,
            uid: uid.as_raw(),
            groups,
            sudo: std::env::var_os("SUDO_COMMAND").is_some(),
        }
    }

    /// True if device checks do not apply.
    pub fn is_privileged(&self) -> bool {
        self.sudo || self.uid == 0
    }
}

/// The ownership and permission bits of a device file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeviceAccess {
    pub owner: u32,
    pub group: String,
    pub mode: u32,
}

const GROUP_READ: u32 = 0o040;
const GROUP_WRITE: u32 = 0o020;
const OTHER_ALL: u32 = 0o007;

impl DeviceAccess {
    pub fn of(path: &Path) -> Result<DeviceAccess> {
        let m = std::fs::metadata(path).map_err(|_| Error::NotFound(path.to_path_buf()))?;
        Ok(DeviceAccess {
            owner: m.uid(),
            group: group_name(Gid::from_raw(m.gid())),
            mode: m.mode(),
        })
    }
}

fn group_name(gid: Gid) -> String {
    Group::from_gid(gid)
        .ok()
        .flatten()
        .map(|g| g.name)
        .unwrap_or_else(|| gid.to_string())
}

/// Decide if the identity may use the device file for the interface.
pub fn evaluate(
    path: &Path,
    id: &Identity,
    access: &DeviceAccess,
    interface: Interface,
) -> Result<()> {
    if id.is_privileged() {
        return Ok(());
    }
    if access.owner == id.uid {
        return Ok(());
    }
    if access.mode & OTHER_ALL != 0 {
        tracing::warn!(
            path = %path.display(),
            mode = %format_args!("{:o}", access.mode & 0o777),
            "device has excessive permissions for others"
        );
    }
    let denied = |detail: String| Error::Permission {
        path: path.to_path_buf(),
        detail,
    };
    if !interface.groups().contains(&access.group.as_str()) {
        tracing::error!(
            path = %path.display(),
            group = %access.group,
            "device does not belong to a {interface} group"
        );
        return Err(denied(format!(
            "belongs to group '{}', should be {}",
            access.group,
            interface.group_list()
        )));
    }
    if access.mode & (GROUP_READ | GROUP_WRITE) == 0 {
        return Err(denied(format!(
            "is not readable or writable by group '{}'",
            access.group
        )));
    }
    if !id.groups.contains(&access.group) {
        tracing::error!(user = %id.user, group = %access.group, "user is not a member of the device group");
        return Err(denied(format!(
            "requires membership of group '{}', which user '{}' lacks",
            access.group, id.user
        )));
    }
    Ok(())
}

/// Check that the current user may open the device file.
pub fn check_device(path: &Path, interface: Interface) -> Result<()> {
    if !path.exists() {
        return Err(Error::NotFound(path.to_path_buf()));
    }
    let id = Identity::current();
    if id.is_privileged() {
        tracing::warn!(
            user = %id.user,
            sudo = id.sudo,
            "running with elevated privileges, consider setting up device permissions instead"
        );
        return Ok(());
    }
    let access = DeviceAccess::of(path)?;
    evaluate(path, &id, &access, interface)
}
