//! Store layout and bootstrap toolchain constants.

/// Directory below the chroot that holds every package root.
pub const STORE_SUBDIR: &str = "re/vi";

/// Provenance file recording the package's origin URL.
pub const URL_FILE: &str = "revi.url";

/// Serialized snapshot of the package graph.
pub const SNAPSHOT_FILE: &str = "revi.json";

/// Executable user build hook. Its presence bypasses every built-in adapter.
pub const HOOK_FILE: &str = ".re.vi";

/// Lua build recipe evaluated by the embedded interpreter.
pub const RECIPE_FILE: &str = "revi.lua";

/// Written once a package has been built, so later runs skip it.
pub const BUILT_STAMP: &str = "revi.built";

/// Multi-call binary whose applets are linked into `<chroot>/bin`.
pub const MULTICALL_BINARY: &str = "bin/busybox";

/// Fallback search path appended after the dependency closure's `bin`
/// directories when running toolchain commands.
pub const BASE_PATH: &str = "/usr/bin:/bin";

/// Suffix of the optional dependency manifest served next to an artifact.
pub const MANIFEST_SUFFIX: &str = ".deps";

pub const BOOTSTRAP_GCC: &str = "http://s.minos.io/archive/bifrost/x86_64/gcc-4.6.1-2.tar.gz";
pub const BOOTSTRAP_MAKE: &str = "http://s.minos.io/archive/morpheus/x86_64/make-3.82.tar.gz";
pub const BUSYBOX: &str = "http://s.minos.io/archive/morpheus/x86_64/busybox-1.22.1.tar.gz";

pub const GCC: &str = "https://mirrorservice.org/sites/sourceware.org/pub/gcc/releases/gcc-11.2.0/gcc-11.2.0.tar.gz";
pub const MAKE: &str = "http://mirrors.kernel.org/gnu/make/make-4.3.tar.gz";
pub const CMAKE: &str = "https://github.com/Kitware/CMake/releases/download/v3.22.0-rc1/cmake-3.22.0-rc1.tar.gz";
pub const PYTHON: &str = "https://www.python.org/ftp/python/3.10.0/Python-3.10.0.tgz";
pub const MUSL: &str = "https://musl.libc.org/releases/musl-1.2.2.tar.gz";

pub const BAZEL_RELEASES: &str = "https://github.com/bazelbuild/bazel/releases/download";
pub const BAZEL_BINARY: &str = "https://github.com/bazelbuild/bazel/releases/download/4.2.1/bazel-4.2.1-linux-x86_64";

/// Install location of the prebuilt bazel binary inside its package root.
pub const BAZEL_TARGET_FILE: &str = "/bin/bazel";

pub const OSTREE_RELEASES: &str = "https://github.com/ostreedev/ostree/releases/download";
pub const OSTREE: &str = "https://github.com/ostreedev/ostree/releases/download/v2021.5/libostree-2021.5.tar.xz";

/// Libc tag selecting the musl toolchain variants.
pub const LIBC_MUSL: &str = "musl";

/// Libc tag of the host-compatible GNU toolchain.
pub const LIBC_GNU: &str = "gnu";
