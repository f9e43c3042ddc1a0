// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! NAS mount point analysis
//!
//! Pure planning for the directory enforcement step: parse each mount's
//! server address, validate extreme file system paths, and derive both the
//! config the helper function mounts and the directories it must create.

use crate::domain::errors::ReconcileError;
use crate::domain::service::{NasAttachment, NasMountPoint};

/// Domain suffix identifying the extreme file system variant.
pub const EXTREME_DOMAIN_SUFFIX: &str = ".extreme.nas.aliyuncs.com";
/// The only export root of an extreme file system.
pub const EXTREME_SHARE_ROOT: &str = "/share";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilesystemVariant {
    Standard,
    Extreme,
}

impl FilesystemVariant {
    /// Root the helper function mounts to see the whole file system.
    pub fn root(self) -> &'static str {
        match self {
            FilesystemVariant::Standard => "/",
            FilesystemVariant::Extreme => EXTREME_SHARE_ROOT,
        }
    }
}

/// `(domain, remote directory, local mount directory)` of one mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    pub domain: String,
    pub remote_dir: String,
    pub mount_dir: String,
}

impl MountPoint {
    /// Split the server address on its last colon. `None` when there is no colon.
    pub fn parse(mount_point: &NasMountPoint) -> Option<Self> {
        let (domain, remote_dir) = mount_point.server_addr.rsplit_once(':')?;
        Some(Self {
            domain: domain.to_string(),
            remote_dir: remote_dir.to_string(),
            mount_dir: mount_point.mount_dir.clone(),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.domain, self.remote_dir)
    }

    pub fn variant(&self) -> FilesystemVariant {
        if self.domain.ends_with(EXTREME_DOMAIN_SUFFIX) {
            FilesystemVariant::Extreme
        } else {
            FilesystemVariant::Standard
        }
    }

    /// Classify the mount, rejecting extreme mounts outside `/share`.
    pub fn validate(&self) -> Result<FilesystemVariant, ReconcileError> {
        let variant = self.variant();
        if variant == FilesystemVariant::Extreme && !is_under_share(&self.remote_dir) {
            return Err(ReconcileError::InvalidExtremeMountPath {
                server_addr: self.server_addr(),
            });
        }
        Ok(variant)
    }

    /// Mount used by the helper function, collapsed to the file system root.
    /// Standard mounts already at the root are left out.
    fn helper_mount(&self, variant: FilesystemVariant) -> Option<NasMountPoint> {
        let root = variant.root();
        if variant == FilesystemVariant::Standard && self.remote_dir == root {
            return None;
        }
        Some(NasMountPoint {
            server_addr: format!("{}:{}", self.domain, root),
            mount_dir: self.mount_dir.clone(),
        })
    }

    /// Local path (inside the helper) of the remote directory, if it needs checking.
    fn directory_to_check(&self, variant: FilesystemVariant) -> Option<String> {
        match variant {
            FilesystemVariant::Extreme if self.remote_dir != EXTREME_SHARE_ROOT => {
                let relative = &self.remote_dir[EXTREME_SHARE_ROOT.len()..];
                Some(join_posix(&self.mount_dir, relative))
            }
            FilesystemVariant::Standard if self.remote_dir != "/" => {
                Some(join_posix(&self.mount_dir, &self.remote_dir))
            }
            _ => None,
        }
    }
}

fn is_under_share(remote_dir: &str) -> bool {
    match remote_dir.strip_prefix(EXTREME_SHARE_ROOT) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Validate every mount point of a config without planning anything.
pub fn validate_mount_points(config: &NasAttachment) -> Result<(), ReconcileError> {
    config
        .mount_points
        .iter()
        .filter_map(MountPoint::parse)
        .try_for_each(|mp| mp.validate().map(|_| ()))
}

/// What the helper function mounts and which directories it must ensure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryPlan {
    /// Config with every remote directory collapsed to the file system root
    pub helper_config: NasAttachment,
    /// Absolute paths inside the helper that must exist
    pub directories: Vec<String>,
    /// Remote directories those paths correspond to, for reporting
    pub remote_dirs: Vec<String>,
}

impl DirectoryPlan {
    pub fn from_config(config: &NasAttachment) -> Result<Self, ReconcileError> {
        let mut helper_mounts = Vec::new();
        let mut directories = Vec::new();
        let mut remote_dirs = Vec::new();

        for mount_point in config.mount_points.iter().filter_map(MountPoint::parse) {
            let variant = mount_point.validate()?;

            if let Some(helper_mount) = mount_point.helper_mount(variant) {
                helper_mounts.push(helper_mount);
            }
            if let Some(directory) = mount_point.directory_to_check(variant) {
                directories.push(directory);
                remote_dirs.push(mount_point.remote_dir.clone());
            }
        }

        Ok(Self {
            helper_config: NasAttachment {
                user_id: config.user_id,
                group_id: config.group_id,
                mount_points: helper_mounts,
            },
            directories,
            remote_dirs,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.directories.is_empty()
    }
}

/// Join two POSIX paths and normalise `.`/`..` and repeated separators.
pub fn join_posix(base: &str, path: &str) -> String {
    let joined = format!("{}/{}", base, path);
    let absolute = joined.starts_with('/');

    let mut parts: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    match (absolute, parts.is_empty()) {
        (true, _) => format!("/{}", parts.join("/")),
        (false, true) => ".".to_string(),
        (false, false) => parts.join("/"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mount(server_addr: &str, mount_dir: &str) -> NasMountPoint {
        NasMountPoint {
            server_addr: server_addr.to_string(),
            mount_dir: mount_dir.to_string(),
        }
    }

    fn config(mounts: Vec<NasMountPoint>) -> NasAttachment {
        NasAttachment {
            user_id: 10003,
            group_id: 10003,
            mount_points: mounts,
        }
    }

    #[test]
    fn test_parse_splits_on_last_colon() {
        let mp = MountPoint::parse(&mount("abc.nas.aliyuncs.com:/a:b", "/mnt/x")).unwrap();
        assert_eq!(mp.domain, "abc.nas.aliyuncs.com:/a");
        assert_eq!(mp.remote_dir, "b");

        assert!(MountPoint::parse(&mount("no-colon", "/mnt/x")).is_none());
    }

    #[test]
    fn test_extreme_mount_rewritten_to_share_root() {
        let plan = DirectoryPlan::from_config(&config(vec![mount(
            "abc.extreme.nas.aliyuncs.com:/share/data",
            "/mnt/d",
        )]))
        .unwrap();

        assert_eq!(
            plan.helper_config.mount_points,
            vec![mount("abc.extreme.nas.aliyuncs.com:/share", "/mnt/d")]
        );
        assert_eq!(plan.directories, vec!["/mnt/d/data".to_string()]);
        assert_eq!(plan.remote_dirs, vec!["/share/data".to_string()]);
        assert_eq!(plan.helper_config.user_id, 10003);
    }

    #[test]
    fn test_extreme_mount_outside_share_rejected() {
        for addr in [
            "abc.extreme.nas.aliyuncs.com:/data",
            "abc.extreme.nas.aliyuncs.com:/shared",
            "abc.extreme.nas.aliyuncs.com:/",
        ] {
            let err = DirectoryPlan::from_config(&config(vec![mount(addr, "/mnt/d")])).unwrap_err();
            assert!(
                matches!(err, ReconcileError::InvalidExtremeMountPath { .. }),
                "{} should be rejected",
                addr
            );
        }
    }

    #[test]
    fn test_extreme_share_root_needs_no_check() {
        let plan = DirectoryPlan::from_config(&config(vec![mount(
            "abc.extreme.nas.aliyuncs.com:/share",
            "/mnt/d",
        )]))
        .unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.helper_config.mount_points.len(), 1);
    }

    #[test]
    fn test_standard_root_mount_excluded() {
        let plan = DirectoryPlan::from_config(&config(vec![
            mount("abc.nas.aliyuncs.com:/", "/mnt/root"),
            mount("abc.nas.aliyuncs.com:/svc/app", "/mnt/app"),
        ]))
        .unwrap();

        assert_eq!(plan.directories, vec!["/mnt/app/svc/app".to_string()]);
        assert_eq!(
            plan.helper_config.mount_points,
            vec![mount("abc.nas.aliyuncs.com:/", "/mnt/app")]
        );
    }

    #[test]
    fn test_helper_mount_uses_variant_root() {
        let extreme = MountPoint::parse(&mount("x.extreme.nas.aliyuncs.com:/share/a", "/mnt/e"));
        let extreme = extreme.unwrap();
        assert_eq!(extreme.variant().root(), "/share");
        assert_eq!(
            extreme.helper_mount(FilesystemVariant::Extreme),
            Some(mount("x.extreme.nas.aliyuncs.com:/share", "/mnt/e"))
        );

        let standard = MountPoint::parse(&mount("x.nas.aliyuncs.com:/a/b", "/mnt/s")).unwrap();
        assert_eq!(standard.variant().root(), "/");
        assert_eq!(
            standard.helper_mount(FilesystemVariant::Standard),
            Some(mount("x.nas.aliyuncs.com:/", "/mnt/s"))
        );

        let at_root = MountPoint::parse(&mount("x.nas.aliyuncs.com:/", "/mnt/r")).unwrap();
        assert_eq!(at_root.helper_mount(FilesystemVariant::Standard), None);
    }

    #[test]
    fn test_validate_mount_points_before_planning() {
        let bad = config(vec![mount("x.extreme.nas.aliyuncs.com:/tmp", "/mnt")]);
        assert!(validate_mount_points(&bad).is_err());

        let good = config(vec![mount("x.nas.aliyuncs.com:/tmp", "/mnt")]);
        assert!(validate_mount_points(&good).is_ok());
    }

    #[test]
    fn test_join_posix() {
        assert_eq!(join_posix("/mnt/d", "/data"), "/mnt/d/data");
        assert_eq!(join_posix("/mnt/d/", "data/"), "/mnt/d/data");
        assert_eq!(join_posix("/mnt/d", ""), "/mnt/d");
        assert_eq!(join_posix("/mnt/d", "../e"), "/mnt/e");
        assert_eq!(join_posix("/", "/"), "/");
        assert_eq!(join_posix("a", "./b"), "a/b");
    }
}
