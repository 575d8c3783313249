//! Unpacking packages and finding the client inside them.
//!
//! A package unpacks to a tree that holds the client in one of two shapes:
//! a bare `tsh` executable, or (macOS) a `tsh.app` bundle with the
//! executable at `Contents/MacOS/tsh`. [`locate_client`] checks an explicit,
//! ordered list of candidate locations instead of walking the tree.

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tar::Archive;
use tkube_core::{Invocation, Os, Platform, ProcessExecutor};
use tracing::{debug, trace};

use crate::package::major;
use crate::{Error, Result};

/// File name of the client executable.
pub const BINARY_NAME: &str = "tsh";

/// Directory name of the macOS application bundle.
pub const BUNDLE_NAME: &str = "tsh.app";

/// Path of the executable inside the bundle.
pub const BUNDLE_EXECUTABLE: &str = "Contents/MacOS/tsh";

/// First major version for which bundles are preferred over bare binaries.
pub const BUNDLE_PRECEDENCE_MAJOR: u32 = 17;

/// Sub-directories of every base directory that may hold the client.
const CANDIDATE_SUBDIRS: &[&str] = &["", "Payload", "Payload/Applications", "Payload/usr/local/bin"];

/// Shape of an unpacked client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientShape {
    /// Application bundle directory.
    Bundle,
    /// Bare executable.
    Bare,
}

/// A located client: the bundle directory or the bare executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCandidate {
    /// Path to the bundle directory or executable.
    pub path: PathBuf,
    /// Its shape.
    pub shape: ClientShape,
}

/// Which shapes to accept and in which order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocatePolicy {
    /// Whether bundles are considered at all.
    pub bundles: bool,
    /// Whether bundles are tried before bare executables.
    pub bundle_first: bool,
}

impl LocatePolicy {
    /// The policy for `version` on `platform`.
    #[must_use]
    pub fn for_version(version: &str, platform: Platform) -> Self {
        let bundles = platform.os == Os::Darwin;
        Self {
            bundles,
            bundle_first: bundles
                && major(version).is_some_and(|m| m >= BUNDLE_PRECEDENCE_MAJOR),
        }
    }

    fn shapes(self) -> Vec<ClientShape> {
        match (self.bundles, self.bundle_first) {
            (false, _) => vec![ClientShape::Bare],
            (true, true) => vec![ClientShape::Bundle, ClientShape::Bare],
            (true, false) => vec![ClientShape::Bare, ClientShape::Bundle],
        }
    }
}

/// Unpack a gzip-compressed tarball into `dest`.
///
/// # Errors
///
/// Returns [`Error::Extraction`] if the archive is unreadable or corrupt.
pub fn unpack_tarball(archive: &Path, dest: &Path) -> Result<()> {
    let package = file_label(archive);
    debug!(?archive, ?dest, "Unpacking tarball");

    let file = File::open(archive).map_err(|e| Error::extraction(&package, e.to_string()))?;
    fs::create_dir_all(dest).map_err(|e| Error::extraction(&package, e.to_string()))?;
    Archive::new(GzDecoder::new(file))
        .unpack(dest)
        .map_err(|e| Error::extraction(&package, e.to_string()))
}

/// Expand a macOS installer package into `dest` with `pkgutil`.
///
/// `dest` must not exist yet.
///
/// # Errors
///
/// Returns [`Error::Extraction`] if `pkgutil` cannot run or fails.
pub async fn expand_pkg(executor: &dyn ProcessExecutor, pkg: &Path, dest: &Path) -> Result<()> {
    let package = file_label(pkg);
    let invocation = Invocation::new("pkgutil")
        .arg("--expand-full")
        .arg(pkg.to_string_lossy())
        .arg(dest.to_string_lossy());
    debug!(command = %invocation, "Expanding installer package");

    let output = executor
        .output(&invocation)
        .await
        .map_err(|e| Error::extraction(&package, format!("failed to run pkgutil: {e}")))?;
    if output.success {
        Ok(())
    } else {
        Err(Error::extraction(
            &package,
            format!("pkgutil failed: {}", output.combined().trim()),
        ))
    }
}

/// Directories that may hold the client, in the order they are checked.
///
/// The tree root comes first, then its child directories sorted by name.
/// Each base is checked at every entry of a fixed list of sub-directories
/// (`Payload`, …) used by installer packages.
///
/// # Errors
///
/// Returns an error if the tree root cannot be read.
pub fn candidate_dirs(tree: &Path) -> Result<Vec<PathBuf>> {
    let mut children: Vec<PathBuf> = fs::read_dir(tree)?
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .map(|entry| entry.path())
        .collect();
    children.sort();

    let bases = std::iter::once(tree.to_path_buf()).chain(children);
    Ok(bases
        .flat_map(|base| {
            CANDIDATE_SUBDIRS.iter().map(move |sub| {
                if sub.is_empty() {
                    base.clone()
                } else {
                    base.join(sub)
                }
            })
        })
        .filter(|dir| dir.is_dir())
        .collect())
}

/// Find the client in an unpacked tree.
///
/// # Errors
///
/// Returns [`Error::BinaryNotFound`] if no candidate location holds the
/// client in an accepted shape.
pub fn locate_client(tree: &Path, package: &str, policy: LocatePolicy) -> Result<ClientCandidate> {
    let dirs = candidate_dirs(tree).map_err(|_| Error::binary_not_found(package))?;

    for shape in policy.shapes() {
        for dir in &dirs {
            let found = match shape {
                ClientShape::Bundle => {
                    let bundle = dir.join(BUNDLE_NAME);
                    bundle.join(BUNDLE_EXECUTABLE).is_file().then_some(bundle)
                }
                ClientShape::Bare => {
                    let binary = dir.join(BINARY_NAME);
                    binary.is_file().then_some(binary)
                }
            };
            if let Some(path) = found {
                debug!(?path, ?shape, "Located client");
                return Ok(ClientCandidate { path, shape });
            }
            trace!(?dir, ?shape, "No client at candidate location");
        }
    }

    Err(Error::binary_not_found(package))
}

/// Copy a located client into `out`, returning the canonical binary path
/// `out/tsh`.
///
/// A bundle is copied whole and `out/tsh` becomes a relative symbolic
/// link to the executable inside it.
///
/// # Errors
///
/// Returns an IO error if copying, linking or setting permissions fails.
pub fn place_client(candidate: &ClientCandidate, out: &Path) -> Result<PathBuf> {
    fs::create_dir_all(out)?;
    let binary = out.join(BINARY_NAME);

    match candidate.shape {
        ClientShape::Bare => {
            fs::copy(&candidate.path, &binary)?;
            make_executable(&binary)?;
        }
        ClientShape::Bundle => {
            let bundle = out.join(BUNDLE_NAME);
            copy_dir(&candidate.path, &bundle)?;
            make_executable(&bundle.join(BUNDLE_EXECUTABLE))?;
            symlink(&Path::new(BUNDLE_NAME).join(BUNDLE_EXECUTABLE), &binary)?;
        }
    }

    debug!(?binary, shape = ?candidate.shape, "Placed client");
    Ok(binary)
}

fn copy_dir(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target = dst.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else if file_type.is_symlink() {
            symlink(&fs::read_link(entry.path())?, &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(not(unix))]
fn symlink(_original: &Path, link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!("cannot create symbolic link {}", link.display()),
    ))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

fn file_label(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tar::{Builder, Header};
    use tempfile::TempDir;
    use tkube_core::{Arch, ProcessOutput};

    fn write_tarball(path: &Path, files: &[(&str, &[u8])]) {
        let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        let mut builder = Builder::new(encoder);
        for (name, content) in files {
            let mut header = Header::new_gnu();
            header.set_path(name).unwrap();
            header.set_size(content.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append(&header, &content[..]).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"#!/bin/sh\n").unwrap();
    }

    const DARWIN: Platform = Platform {
        os: Os::Darwin,
        arch: Arch::Arm64,
    };
    const LINUX: Platform = Platform {
        os: Os::Linux,
        arch: Arch::X86_64,
    };

    #[test]
    fn test_unpack_and_locate_bare() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("teleport.tar.gz");
        write_tarball(
            &archive,
            &[
                ("teleport/tsh", b"tsh"),
                ("teleport/tctl", b"tctl"),
                ("teleport/README.md", b"readme"),
            ],
        );

        let tree = temp.path().join("tree");
        unpack_tarball(&archive, &tree).unwrap();

        let found = locate_client(
            &tree,
            "teleport.tar.gz",
            LocatePolicy::for_version("14.2.1", LINUX),
        )
        .unwrap();
        assert_eq!(found.shape, ClientShape::Bare);
        assert_eq!(found.path, tree.join("teleport").join("tsh"));
    }

    #[test]
    fn test_unpack_corrupt_archive() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("broken.tar.gz");
        fs::write(&archive, b"not gzip").unwrap();

        let err = unpack_tarball(&archive, &temp.path().join("tree")).unwrap_err();
        assert!(matches!(err, Error::Extraction { ref package, .. } if package == "broken.tar.gz"));
    }

    #[test]
    fn test_bundle_precedence_by_major() {
        let temp = TempDir::new().unwrap();
        let tree = temp.path();
        touch(&tree.join("teleport").join("tsh"));
        touch(&tree.join("teleport").join(BUNDLE_NAME).join(BUNDLE_EXECUTABLE));

        let new = locate_client(tree, "p", LocatePolicy::for_version("17.0.2", DARWIN)).unwrap();
        assert_eq!(new.shape, ClientShape::Bundle);
        assert_eq!(new.path, tree.join("teleport").join(BUNDLE_NAME));

        let old = locate_client(tree, "p", LocatePolicy::for_version("16.5.12", DARWIN)).unwrap();
        assert_eq!(old.shape, ClientShape::Bare);

        let linux = locate_client(tree, "p", LocatePolicy::for_version("17.0.2", LINUX)).unwrap();
        assert_eq!(linux.shape, ClientShape::Bare);
    }

    #[test]
    fn test_bundle_without_executable_is_ignored() {
        let temp = TempDir::new().unwrap();
        let tree = temp.path();
        fs::create_dir_all(tree.join("Payload").join(BUNDLE_NAME).join("Contents")).unwrap();

        let err =
            locate_client(tree, "tsh-17.0.0.pkg", LocatePolicy::for_version("17.0.0", DARWIN))
                .unwrap_err();
        assert!(matches!(err, Error::BinaryNotFound { .. }));
    }

    #[test]
    fn test_pkg_payload_location() {
        let temp = TempDir::new().unwrap();
        let tree = temp.path();
        touch(
            &tree
                .join("tsh.pkg")
                .join("Payload")
                .join(BUNDLE_NAME)
                .join(BUNDLE_EXECUTABLE),
        );

        let found =
            locate_client(tree, "p", LocatePolicy::for_version("16.5.12", DARWIN)).unwrap();
        assert_eq!(found.shape, ClientShape::Bundle);
        assert_eq!(found.path, tree.join("tsh.pkg").join("Payload").join(BUNDLE_NAME));
    }

    #[test]
    fn test_candidate_order_is_sorted() {
        let temp = TempDir::new().unwrap();
        let tree = temp.path();
        touch(&tree.join("b").join("tsh"));
        touch(&tree.join("a").join("tsh"));

        let found = locate_client(tree, "p", LocatePolicy::for_version("14.0.0", LINUX)).unwrap();
        assert_eq!(found.path, tree.join("a").join("tsh"));
    }

    #[cfg(unix)]
    #[test]
    fn test_place_bare() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src").join("tsh");
        touch(&src);
        fs::set_permissions(&src, fs::Permissions::from_mode(0o644)).unwrap();

        let out = temp.path().join("out");
        let binary = place_client(
            &ClientCandidate {
                path: src,
                shape: ClientShape::Bare,
            },
            &out,
        )
        .unwrap();

        assert_eq!(binary, out.join("tsh"));
        let mode = fs::metadata(&binary).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[cfg(unix)]
    #[test]
    fn test_place_bundle_links_executable() {
        let temp = TempDir::new().unwrap();
        let bundle = temp.path().join("src").join(BUNDLE_NAME);
        touch(&bundle.join(BUNDLE_EXECUTABLE));
        touch(&bundle.join("Contents").join("Info.plist"));

        let out = temp.path().join("out");
        let binary = place_client(
            &ClientCandidate {
                path: bundle,
                shape: ClientShape::Bundle,
            },
            &out,
        )
        .unwrap();

        assert!(fs::symlink_metadata(&binary).unwrap().file_type().is_symlink());
        assert_eq!(
            fs::read_link(&binary).unwrap(),
            Path::new("tsh.app/Contents/MacOS/tsh")
        );
        assert!(binary.is_file());
        assert!(out.join(BUNDLE_NAME).join("Contents").join("Info.plist").is_file());
    }

    struct ScriptedPkgutil(bool);

    #[async_trait::async_trait]
    impl ProcessExecutor for ScriptedPkgutil {
        async fn output(&self, invocation: &Invocation) -> std::io::Result<ProcessOutput> {
            assert_eq!(invocation.program(), Path::new("pkgutil"));
            assert_eq!(invocation.args[0], "--expand-full");
            if self.0 {
                let dest = Path::new(&invocation.args[2]);
                touch(&dest.join("Payload").join("tsh"));
                Ok(ProcessOutput::success(""))
            } else {
                Ok(ProcessOutput::failure(1, "Error: could not open package"))
            }
        }

        async fn interactive(&self, invocation: &Invocation) -> std::io::Result<ProcessOutput> {
            self.output(invocation).await
        }
    }

    #[tokio::test]
    async fn test_expand_pkg() {
        let temp = TempDir::new().unwrap();
        let pkg = temp.path().join("tsh-16.5.12.pkg");
        let dest = temp.path().join("expanded");

        expand_pkg(&ScriptedPkgutil(true), &pkg, &dest).await.unwrap();
        assert!(dest.join("Payload").join("tsh").is_file());

        let err = expand_pkg(&ScriptedPkgutil(false), &pkg, &temp.path().join("other"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::Extraction { ref message, .. } if message.contains("could not open"))
        );
    }
}
