//! End-to-end tests: resolve over HTTP, unpack into the store, build.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{TestStore, targz, tarxz};
use revi_lib::consts::{BUILT_STAMP, SNAPSHOT_FILE, URL_FILE};
use revi_lib::fetch::{BootstrapTable, Fetcher, ResolveOptions};
use revi_lib::pkg::{Package, PackageCfg, PackageSnapshot};
use revi_lib::util::hash::hash_directory;

const HOOK: &[u8] = b"#!/bin/sh\nroot=\"$1\"; shift\nfor dep in \"$@\"; do cat \"$dep/share/name\" >> \"$root/deps.txt\"; done\n";

fn fetcher(store: &TestStore) -> Arc<Fetcher> {
  Fetcher::with_bootstrap(
    ResolveOptions {
      chroot: store.chroot(),
      libc: None,
    },
    BootstrapTable::empty(),
  )
}

#[tokio::test]
async fn fetch_unpack_build_with_hook() {
  let store = TestStore::new();
  let mut server = mockito::Server::new_async().await;
  let base = server.url();

  server
    .mock("GET", "/app.tar.gz")
    .with_body(targz(&[(".re.vi", HOOK, 0o755), ("src/main.c", b"int main;", 0o644)]))
    .create_async()
    .await;
  server
    .mock("GET", "/app.tar.gz.deps")
    .with_body(format!("{base}/zlib.tar.gz\n{base}/lzma.tar.xz\n"))
    .create_async()
    .await;
  server
    .mock("GET", "/zlib.tar.gz")
    .with_body(targz(&[("share/name", b"zlib\n", 0o644)]))
    .create_async()
    .await;
  server
    .mock("GET", "/lzma.tar.xz")
    .with_body(tarxz(&[("share/name", b"lzma\n", 0o644)]))
    .create_async()
    .await;

  let pkg = fetcher(&store).fetch(&format!("{base}/app.tar.gz")).await.unwrap();
  store.unpacker().unpack(pkg.clone()).await.unwrap();
  store.builder().build(pkg.clone()).await.unwrap();

  assert_eq!(std::fs::read_to_string(pkg.join("deps.txt")).unwrap(), "zlib\nlzma\n");
  assert_eq!(
    std::fs::read_to_string(pkg.join(URL_FILE)).unwrap(),
    format!("{base}/app.tar.gz")
  );
  for dep in pkg.deps() {
    assert!(dep.join(BUILT_STAMP).is_file());
  }

  let snapshot = PackageSnapshot::read(&pkg.join(SNAPSHOT_FILE)).unwrap();
  assert_eq!(snapshot.deps.len(), 2);
  assert_eq!(snapshot.deps[1].url, format!("{base}/lzma.tar.xz"));
}

#[tokio::test]
async fn rerunning_the_pipeline_is_a_noop() {
  let store = TestStore::new();
  let mut server = mockito::Server::new_async().await;
  let base = server.url();
  server
    .mock("GET", "/app.tar.gz")
    .with_body(targz(&[(".re.vi", b"#!/bin/sh\necho run >> \"$1/runs\"\n", 0o755)]))
    .expect(2)
    .create_async()
    .await;

  for _ in 0..2 {
    let pkg = fetcher(&store).fetch(&format!("{base}/app.tar.gz")).await.unwrap();
    store.unpacker().unpack(pkg.clone()).await.unwrap();
    store.builder().build(pkg.clone()).await.unwrap();
    assert_eq!(std::fs::read_to_string(pkg.join("runs")).unwrap(), "run\n");
  }
}

#[tokio::test]
async fn patches_take_part_in_the_address() {
  let store = TestStore::new();
  let tarball = targz(&[("etc/conf", b"upstream", 0o644)]);
  let plain = Arc::new(Package::new("https://example.test/conf.tar.gz", tarball.clone()).with_cfg(PackageCfg {
    chroot: store.chroot(),
    ..Default::default()
  }));
  let mut patch = BTreeMap::new();
  patch.insert("/etc/conf".to_string(), b"patched".to_vec());
  let patched = Arc::new(Package::new("https://example.test/conf.tar.gz", tarball).with_cfg(PackageCfg {
    chroot: store.chroot(),
    patch,
    ..Default::default()
  }));

  let unpacker = store.unpacker();
  unpacker.unpack(plain.clone()).await.unwrap();
  unpacker.unpack(patched.clone()).await.unwrap();

  assert_ne!(plain.path(), patched.path());
  assert_eq!(std::fs::read(plain.join("etc/conf")).unwrap(), b"upstream");
  assert_eq!(std::fs::read(patched.join("etc/conf")).unwrap(), b"patched");
}

#[tokio::test]
async fn gzip_and_xz_artifacts_extract_identically() {
  let files: &[(&str, &[u8], u32)] = &[("bin/tool", b"#!/bin/sh\n", 0o755), ("lib/libx.so", b"\x7fELF", 0o644)];
  let gz_store = TestStore::new();
  let xz_store = TestStore::new();
  let gz = Arc::new(Package::new("https://example.test/x", targz(files)).with_cfg(PackageCfg {
    chroot: gz_store.chroot(),
    ..Default::default()
  }));
  let xz = Arc::new(Package::new("https://example.test/x", tarxz(files)).with_cfg(PackageCfg {
    chroot: xz_store.chroot(),
    ..Default::default()
  }));

  gz_store.unpacker().unpack(gz.clone()).await.unwrap();
  xz_store.unpacker().unpack(xz.clone()).await.unwrap();

  let exclude = [URL_FILE, SNAPSHOT_FILE];
  assert_eq!(
    hash_directory(&gz.path(), &exclude).unwrap(),
    hash_directory(&xz.path(), &exclude).unwrap()
  );
}
