//! Platform identification for client packages.
//!
//! Packages are published per operating system and CPU architecture. The
//! types here describe the host (or an explicitly chosen target) and know the
//! vendor's spelling of each component.

use std::fmt;

/// Platform identifier combining OS and architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    /// Operating system.
    pub os: Os,
    /// CPU architecture.
    pub arch: Arch,
}

impl Platform {
    /// Create a new platform.
    #[must_use]
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Get the current platform.
    #[must_use]
    pub fn current() -> Self {
        Self {
            os: Os::current(),
            arch: Arch::current(),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

/// Operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    /// macOS
    Darwin,
    /// Linux
    Linux,
    /// Any other operating system, by its Rust target name.
    Other(&'static str),
}

impl Os {
    /// Get the current OS.
    #[must_use]
    pub fn current() -> Self {
        match std::env::consts::OS {
            "macos" => Self::Darwin,
            "linux" => Self::Linux,
            other => Self::Other(other),
        }
    }

    /// Whether client packages are published for this OS.
    #[must_use]
    pub fn is_supported(self) -> bool {
        matches!(self, Self::Darwin | Self::Linux)
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Darwin => write!(f, "darwin"),
            Self::Linux => write!(f, "linux"),
            Self::Other(name) => write!(f, "{name}"),
        }
    }
}

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    /// 64-bit ARM
    Arm64,
    /// 64-bit x86
    X86_64,
    /// Any other architecture, by its Rust target name.
    Other(&'static str),
}

impl Arch {
    /// Get the current architecture.
    #[must_use]
    pub fn current() -> Self {
        match std::env::consts::ARCH {
            "aarch64" => Self::Arm64,
            "x86_64" => Self::X86_64,
            other => Self::Other(other),
        }
    }

    /// The architecture name used in published package filenames.
    #[must_use]
    pub fn vendor_name(self) -> &'static str {
        match self {
            Self::Arm64 => "arm64",
            Self::X86_64 => "x86_64",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.vendor_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_display() {
        assert_eq!(
            Platform::new(Os::Darwin, Arch::Arm64).to_string(),
            "darwin-arm64"
        );
        assert_eq!(
            Platform::new(Os::Linux, Arch::X86_64).to_string(),
            "linux-x86_64"
        );
        assert_eq!(
            Platform::new(Os::Other("windows"), Arch::X86_64).to_string(),
            "windows-x86_64"
        );
    }

    #[test]
    fn test_vendor_names() {
        assert_eq!(Arch::X86_64.vendor_name(), "x86_64");
        assert_eq!(Arch::Arm64.vendor_name(), "arm64");
        assert_eq!(Arch::Other("riscv64").vendor_name(), "riscv64");
    }

    #[test]
    fn test_os_support() {
        assert!(Os::Darwin.is_supported());
        assert!(Os::Linux.is_supported());
        assert!(!Os::Other("windows").is_supported());
    }

    #[test]
    fn test_platform_current() {
        let p = Platform::current();
        assert!(!p.os.to_string().is_empty());
        assert!(!p.arch.to_string().is_empty());
    }
}
