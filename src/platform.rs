//! Platform queries.
//!
//! Pure, side-effect-free facts about the build target. They do not depend
//! on the lifecycle state and may be called at any time. Numeric codes are
//! part of the runtime ABI and must not change.

/// Operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OsFamily {
    /// Unrecognized target.
    Unknown = 0,
    /// macOS.
    MacOsX = 1,
    /// iOS.
    Ios = 2,
    /// Linux.
    Linux = 3,
    /// Windows.
    Windows = 4,
    /// Android.
    Android = 5,
    /// WebAssembly.
    Wasm = 6,
    /// tvOS.
    TvOs = 7,
    /// watchOS.
    WatchOs = 8,
}

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CpuArchitecture {
    /// Unrecognized target.
    Unknown = 0,
    /// 32-bit ARM.
    Arm32 = 1,
    /// 64-bit ARM.
    Arm64 = 2,
    /// 32-bit x86.
    X86 = 3,
    /// x86-64.
    X64 = 4,
    /// Big-endian 32-bit MIPS.
    Mips32 = 5,
    /// Little-endian 32-bit MIPS.
    Mipsel32 = 6,
    /// 32-bit WebAssembly.
    Wasm32 = 7,
}

/// Memory model the runtime was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MemoryModel {
    /// Objects are confined to the thread that created them.
    Strict = 0,
    /// Objects may be shared between threads.
    Relaxed = 1,
}

/// Returns true on little-endian targets.
pub fn is_little_endian() -> bool {
    cfg!(target_endian = "little")
}

/// Returns true if the target tolerates unaligned memory accesses.
pub fn can_access_unaligned() -> bool {
    !cfg!(feature = "no-unaligned-access")
}

/// Returns true for debug builds.
pub fn is_debug_binary() -> bool {
    cfg!(debug_assertions)
}

/// Returns the operating system family of the target.
pub fn os_family() -> OsFamily {
    if cfg!(target_os = "macos") {
        OsFamily::MacOsX
    } else if cfg!(target_os = "ios") {
        OsFamily::Ios
    } else if cfg!(target_os = "tvos") {
        OsFamily::TvOs
    } else if cfg!(target_os = "watchos") {
        OsFamily::WatchOs
    } else if cfg!(target_os = "android") {
        OsFamily::Android
    } else if cfg!(target_os = "linux") {
        OsFamily::Linux
    } else if cfg!(target_os = "windows") {
        OsFamily::Windows
    } else if cfg!(target_family = "wasm") {
        OsFamily::Wasm
    } else {
        OsFamily::Unknown
    }
}

/// Returns the CPU architecture of the target.
pub fn cpu_architecture() -> CpuArchitecture {
    if cfg!(target_arch = "arm") {
        CpuArchitecture::Arm32
    } else if cfg!(target_arch = "aarch64") {
        CpuArchitecture::Arm64
    } else if cfg!(target_arch = "x86") {
        CpuArchitecture::X86
    } else if cfg!(target_arch = "x86_64") {
        CpuArchitecture::X64
    } else if cfg!(all(target_arch = "mips", target_endian = "big")) {
        CpuArchitecture::Mips32
    } else if cfg!(all(target_arch = "mips", target_endian = "little")) {
        CpuArchitecture::Mipsel32
    } else if cfg!(target_arch = "wasm32") {
        CpuArchitecture::Wasm32
    } else {
        CpuArchitecture::Unknown
    }
}

/// Returns the memory model selected at build time.
pub fn memory_model() -> MemoryModel {
    if cfg!(feature = "relaxed-memory-model") {
        MemoryModel::Relaxed
    } else {
        MemoryModel::Strict
    }
}
