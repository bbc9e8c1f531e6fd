use std::os::raw::{c_int, c_void};
use std::sync::{Arc, Mutex};
use std::thread;

use lfs_bridge::backend::{FileBlockDevice, FileBlockDeviceBuilder, MemBlockDevice};
use lfs_bridge::{
    BlockDevice, Bridge, CallbackDriver, ConfigRecord, ContextHandle, Engine, Filesystem,
    Geometry, LfsError, ERASED_BYTE,
};
use proptest::prelude::*;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn scenario_geometry() -> Geometry {
    Geometry {
        read_size: 16,
        prog_size: 16,
        block_size: 4096,
        block_count: 64,
        cache_size: 16,
        lookahead_size: 16,
        block_cycles: 100,
    }
}

fn mounted(geometry: Geometry, device: impl BlockDevice + Send + 'static) -> Filesystem<CallbackDriver> {
    let mut fs = Filesystem::new(CallbackDriver::new(), geometry, device).unwrap();
    fs.mount().unwrap();
    fs
}

fn is_engine_status(status: c_int) -> bool {
    status == 0 || LfsError::ALL.iter().any(|err| err.code() == status)
}

/// Memory device whose program operation can be told to fail before it
/// touches the image.
struct FailingProgram {
    inner: MemBlockDevice,
    fail_with: Arc<Mutex<Option<LfsError>>>,
}

impl BlockDevice for FailingProgram {
    fn read_block(&mut self, block: u32, offset: u32, buf: &mut [u8]) -> Result<(), LfsError> {
        self.inner.read_block(block, offset, buf)
    }

    fn program_block(&mut self, block: u32, offset: u32, buf: &[u8]) -> Result<(), LfsError> {
        if let Some(err) = *self.fail_with.lock().unwrap() {
            return Err(err);
        }
        self.inner.program_block(block, offset, buf)
    }

    fn erase_block(&mut self, block: u32) -> Result<(), LfsError> {
        self.inner.erase_block(block)
    }

    fn sync(&mut self) -> Result<(), LfsError> {
        self.inner.sync()
    }
}

/// Device that panics on every operation.
struct Exploding;

impl BlockDevice for Exploding {
    fn read_block(&mut self, _: u32, _: u32, _: &mut [u8]) -> Result<(), LfsError> {
        panic!("read exploded")
    }

    fn program_block(&mut self, _: u32, _: u32, buf: &[u8]) -> Result<(), LfsError> {
        // Out-of-bounds indexing inside the backend.
        let past_end = buf[buf.len()];
        Err(if past_end == 0 { LfsError::Io } else { LfsError::Corrupt })
    }

    fn erase_block(&mut self, _: u32) -> Result<(), LfsError> {
        panic!("erase exploded")
    }

    fn sync(&mut self) -> Result<(), LfsError> {
        std::panic::panic_any(42u32)
    }
}

#[test]
fn programmed_block_reads_back_after_sync() {
    init_logging();
    let geometry = scenario_geometry();
    let fs = mounted(geometry, MemBlockDevice::new(geometry.block_size, geometry.block_count));
    let driver = fs.engine();

    assert_eq!(driver.prog(3, 0, &[0xaa; 16]), 0);
    assert_eq!(driver.sync(), 0);
    let mut buf = [0u8; 16];
    assert_eq!(driver.read(3, 0, &mut buf), 0);
    assert_eq!(buf, [0xaa; 16]);
}

#[test]
fn erased_block_reads_as_fill_pattern() {
    init_logging();
    let geometry = scenario_geometry();
    let fs = mounted(geometry, MemBlockDevice::new(geometry.block_size, geometry.block_count));
    let driver = fs.engine();

    assert_eq!(driver.prog(5, 0, &[0x00; 16]), 0);
    assert_eq!(driver.erase(5), 0);
    let mut buf = [0u8; 16];
    assert_eq!(driver.read(5, 0, &mut buf), 0);
    assert_eq!(buf, [ERASED_BYTE; 16]);
}

#[test]
fn failed_program_returns_exact_code_without_mutation() {
    init_logging();
    let geometry = scenario_geometry();
    let fail_with = Arc::new(Mutex::new(Some(LfsError::Io)));
    let device = FailingProgram {
        inner: MemBlockDevice::new(geometry.block_size, geometry.block_count),
        fail_with: fail_with.clone(),
    };
    let fs = mounted(geometry, device);
    let driver = fs.engine();

    assert_eq!(driver.prog(3, 0, &[0xaa; 16]), -5);
    let mut buf = [0u8; 16];
    assert_eq!(driver.read(3, 0, &mut buf), 0);
    assert_eq!(buf, [ERASED_BYTE; 16]);

    *fail_with.lock().unwrap() = Some(LfsError::NoSpace);
    assert_eq!(driver.prog(3, 0, &[0xaa; 16]), LfsError::NoSpace.code());

    *fail_with.lock().unwrap() = None;
    assert_eq!(driver.prog(3, 0, &[0xaa; 16]), 0);
}

#[test]
fn backend_panics_are_contained() {
    init_logging();
    let fs = mounted(Geometry::default(), Exploding);
    let driver = fs.engine();
    let mut buf = [0u8; 16];

    assert_eq!(driver.read(0, 0, &mut buf), LfsError::Io.code());
    assert_eq!(driver.prog(0, 0, &buf), LfsError::Io.code());
    assert_eq!(driver.erase(0), LfsError::Io.code());
    assert_eq!(driver.sync(), LfsError::Io.code());
    // Still callable after every operation panicked once.
    assert_eq!(driver.erase(1), LfsError::Io.code());
}

#[test]
fn format_failure_surfaces_through_filesystem() {
    init_logging();
    let mut fs = Filesystem::new(CallbackDriver::new(), Geometry::default(), Exploding).unwrap();
    match fs.format() {
        Err(lfs_bridge::BridgeError::Engine(LfsError::Io)) => (),
        other => panic!("expected an I/O error, got {:?}", other),
    }
}

#[test]
fn mount_rejects_inconsistent_geometry() {
    init_logging();
    let geometry = Geometry {
        cache_size: 24,
        ..Geometry::default()
    };
    let mut fs = Filesystem::new(CallbackDriver::new(), geometry, MemBlockDevice::new(512, 32)).unwrap();
    match fs.mount() {
        Err(lfs_bridge::BridgeError::Engine(LfsError::InvalidParam)) => (),
        other => panic!("expected an invalid parameter error, got {:?}", other),
    }
}

#[test]
fn independent_mounts_run_concurrently() {
    init_logging();
    let workers: Vec<_> = (0..4u8)
        .map(|n| {
            thread::spawn(move || {
                let geometry = Geometry::default();
                let mut fs = Filesystem::new(
                    CallbackDriver::new(),
                    geometry,
                    MemBlockDevice::new(geometry.block_size, geometry.block_count),
                )
                .unwrap();
                fs.format().unwrap();
                fs.mount().unwrap();
                for block in 0..geometry.block_count {
                    assert_eq!(fs.engine().prog(block, 0, &[n; 16]), 0);
                }
                for block in 0..geometry.block_count {
                    let mut buf = [0u8; 16];
                    assert_eq!(fs.engine().read(block, 0, &mut buf), 0);
                    assert_eq!(buf, [n; 16]);
                }
                fs.unmount().unwrap();
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
}

#[test]
fn record_can_be_driven_from_another_thread() {
    init_logging();
    let bridge = Bridge::new(Geometry::default(), MemBlockDevice::new(512, 32)).unwrap();
    let bridge = thread::spawn(move || {
        let mut driver = CallbackDriver::new();
        assert_eq!(driver.mount(bridge.config()), 0);
        assert_eq!(driver.prog(1, 0, b"moved"), 0);
        assert_eq!(driver.unmount(), 0);
        bridge
    })
    .join()
    .unwrap();

    let mut buf = [0u8; 5];
    bridge
        .with_device(|dev| dev.read_block(1, 0, &mut buf))
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"moved");
}

#[test]
fn file_image_survives_remount() {
    init_logging();
    let geometry = Geometry::default();
    let disk = tempfile::NamedTempFile::new().unwrap();
    let device = FileBlockDeviceBuilder::from(disk.reopen().unwrap())
        .with_geometry(geometry.block_size, geometry.block_count)
        .build()
        .unwrap();

    let mut fs = Filesystem::new(CallbackDriver::new(), geometry, device).unwrap();
    fs.format().unwrap();
    fs.mount().unwrap();
    assert_eq!(fs.engine().prog(9, 32, b"littlefs"), 0);
    fs.unmount().unwrap();
    drop(fs);

    let device = FileBlockDevice::open(disk.path(), geometry.block_size, geometry.block_count).unwrap();
    let fs = mounted(geometry, device);
    let mut buf = [0u8; 8];
    assert_eq!(fs.engine().read(9, 32, &mut buf), 0);
    assert_eq!(&buf, b"littlefs");
    assert_eq!(fs.engine().read(9, 0, &mut buf), 0);
    assert_eq!(buf, [ERASED_BYTE; 8]);
}

const ABORT_CHILD: &str = "LFS_BRIDGE_ABORT_CHILD";

fn running_as_child(test: &str) -> bool {
    std::env::var(ABORT_CHILD).map_or(false, |name| name == test)
}

/// Re-runs `test` alone in a child process and expects it to die of SIGABRT.
fn assert_child_aborts(test: &str) {
    let status = std::process::Command::new(std::env::current_exe().unwrap())
        .args(&["--exact", test, "--nocapture", "--test-threads=1"])
        .env(ABORT_CHILD, test)
        .status()
        .expect("failed to re-run test binary");
    assert!(!status.success(), "{} did not abort the process", test);

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(status.signal(), Some(6), "expected SIGABRT, got {:?}", status);
    }
}

#[test]
fn use_after_unmount_aborts() {
    if running_as_child("use_after_unmount_aborts") {
        let mut bridge = Bridge::new(Geometry::default(), MemBlockDevice::new(512, 32)).unwrap();
        let mut driver = CallbackDriver::new();
        assert_eq!(driver.mount(bridge.config()), 0);
        bridge.take_device().unwrap();
        // The record is still allocated but its device is gone.
        driver.erase(0);
        // Only reached if the stale context went unnoticed.
        std::process::exit(0);
    }
    assert_child_aborts("use_after_unmount_aborts");
}

#[test]
fn unbound_record_aborts() {
    if running_as_child("unbound_record_aborts") {
        let record = ConfigRecord::allocate()
            .with_geometry(&Geometry::default())
            .bind_callbacks();
        let mut driver = CallbackDriver::new();
        assert_eq!(driver.mount(&record), 0);
        driver.sync();
        std::process::exit(0);
    }
    assert_child_aborts("unbound_record_aborts");
}

#[test]
fn out_of_range_context_aborts() {
    if running_as_child("out_of_range_context_aborts") {
        // Index 200 with generation 1; the registry only has 64 slots.
        let bogus = ContextHandle::from_context(((1usize << 8) | 200) as *const c_void).unwrap();
        let mut record = ConfigRecord::allocate()
            .with_geometry(&Geometry::default())
            .bind_callbacks();
        record.set_context(bogus);
        let mut driver = CallbackDriver::new();
        assert_eq!(driver.mount(&record), 0);
        let mut buf = [0u8; 16];
        driver.read(0, 0, &mut buf);
        std::process::exit(0);
    }
    assert_child_aborts("out_of_range_context_aborts");
}

fn region(geometry: Geometry) -> impl Strategy<Value = (u32, u32, Vec<u8>)> {
    (0..geometry.block_count, 0..geometry.block_size).prop_flat_map(move |(block, offset)| {
        let room = (geometry.block_size - offset) as usize;
        (
            Just(block),
            Just(offset),
            proptest::collection::vec(any::<u8>(), 0..=room.min(256)),
        )
    })
}

#[derive(Debug, Clone)]
enum Call {
    Read(u32, u32, usize),
    Prog(u32, u32, Vec<u8>),
    Erase(u32),
    Sync,
}

fn call() -> impl Strategy<Value = Call> {
    // Ranges deliberately run past the 8x256 geometry used below.
    prop_oneof![
        (0..12u32, 0..300u32, 0..64usize).prop_map(|(b, o, n)| Call::Read(b, o, n)),
        (0..12u32, 0..300u32, proptest::collection::vec(any::<u8>(), 0..64))
            .prop_map(|(b, o, d)| Call::Prog(b, o, d)),
        (0..12u32).prop_map(Call::Erase),
        Just(Call::Sync),
    ]
}

proptest! {
    #[test]
    fn program_sync_read_round_trips((block, offset, data) in region(scenario_geometry())) {
        let geometry = scenario_geometry();
        let fs = mounted(geometry, MemBlockDevice::new(geometry.block_size, geometry.block_count));
        let driver = fs.engine();

        prop_assert_eq!(driver.prog(block, offset, &data), 0);
        prop_assert_eq!(driver.sync(), 0);
        let mut out = vec![0u8; data.len()];
        prop_assert_eq!(driver.read(block, offset, &mut out), 0);
        prop_assert_eq!(out, data);
    }

    #[test]
    fn statuses_stay_in_engine_vocabulary(calls in proptest::collection::vec(call(), 1..32)) {
        let geometry = Geometry {
            block_size: 256,
            block_count: 8,
            ..Geometry::default()
        };
        let fs = mounted(geometry, MemBlockDevice::new(geometry.block_size, geometry.block_count));
        let driver = fs.engine();

        for call in calls {
            let status = match call {
                Call::Read(block, offset, len) => {
                    let mut buf = vec![0u8; len];
                    driver.read(block, offset, &mut buf)
                }
                Call::Prog(block, offset, data) => driver.prog(block, offset, &data),
                Call::Erase(block) => driver.erase(block),
                Call::Sync => driver.sync(),
            };
            prop_assert!(is_engine_status(status), "unexpected status {}", status);
        }
    }
}

#[test]
fn filesystem_is_generic_over_engines() {
    fn format_and_mount<E: Engine>(fs: &mut Filesystem<E>) {
        fs.format().unwrap();
        fs.mount().unwrap();
    }

    let mut fs = Filesystem::new(CallbackDriver::new(), Geometry::default(), MemBlockDevice::new(512, 32)).unwrap();
    format_and_mount(&mut fs);
    assert!(fs.is_mounted());
    let device = fs.into_device().unwrap();
    drop(device);
}
