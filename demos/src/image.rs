use std::env;
use std::fs::OpenOptions;

use log::info;

use lfs_bridge::backend::FileBlockDeviceBuilder;
use lfs_bridge::{CallbackDriver, Filesystem, Geometry};

const GREETING: &[u8] = b"hello from the bridge";

pub fn main() {
    env_logger::init();

    // Image file to format, or an anonymous temporary file.
    let file = match env::args().nth(1) {
        Some(path) => OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .expect("Could not open image file."),
        None => tempfile::tempfile().expect("Could not create a temporary image."),
    };

    let geometry = Geometry::default();
    let dev = FileBlockDeviceBuilder::from(file)
        .with_geometry(geometry.block_size, geometry.block_count)
        .build()
        .expect("Could not initialize disk image.");

    let mut fs = Filesystem::new(CallbackDriver::new(), geometry, dev).expect("should register");
    fs.format().expect("should format");
    fs.mount().expect("should mount");
    info!("mounted {:?}", fs.bridge());

    let driver = fs.engine();
    assert_eq!(driver.prog(1, 0, GREETING), 0);
    assert_eq!(driver.sync(), 0);

    let mut buf = vec![0u8; GREETING.len()];
    assert_eq!(driver.read(1, 0, &mut buf), 0);
    println!(
        "{} blocks of {} bytes, block 1 reads {:?}",
        geometry.block_count,
        geometry.block_size,
        String::from_utf8_lossy(&buf)
    );

    fs.unmount().expect("should unmount");
}
