use std::fs;
use std::path::Path;
use std::sync::Arc;

use rock64_gpio::{
    BootMedia, GpioBackend, GpioConfig, GpioManager, PinMode, Pull, SysfsBackend,
};

fn fake_sysfs(root: &Path, exported: &[u32]) {
    fs::write(root.join("export"), "").unwrap();
    fs::write(root.join("unexport"), "").unwrap();
    for pin in exported {
        let dir = root.join(format!("gpio{pin}"));
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("direction"), "in").unwrap();
        fs::write(dir.join("active_low"), "0").unwrap();
        fs::write(dir.join("value"), "0\n").unwrap();
    }
}

fn read(root: &Path, file: &str) -> String {
    fs::read_to_string(root.join(file)).unwrap()
}

#[test]
fn export_writes_pin_number() {
    let temp_dir = tempfile::tempdir().unwrap();
    fake_sysfs(temp_dir.path(), &[]);
    let backend = SysfsBackend::new(temp_dir.path());

    backend.export(89).unwrap();
    assert_eq!(read(temp_dir.path(), "export"), "89");

    backend.unexport(104).unwrap();
    assert_eq!(read(temp_dir.path(), "unexport"), "104");
}

#[test]
fn export_without_control_file_fails() {
    let temp_dir = tempfile::tempdir().unwrap();
    let backend = SysfsBackend::new(temp_dir.path());

    assert!(backend.export(89).is_err());
    assert!(!temp_dir.path().join("export").exists());
}

#[test]
fn exported_check_looks_for_pin_directory() {
    let temp_dir = tempfile::tempdir().unwrap();
    fake_sysfs(temp_dir.path(), &[89]);
    let backend = SysfsBackend::new(temp_dir.path());

    assert!(backend.is_exported(89));
    assert!(!backend.is_exported(88));
}

#[test]
fn direction_and_polarity_overwrite_previous_value() {
    let temp_dir = tempfile::tempdir().unwrap();
    fake_sysfs(temp_dir.path(), &[89]);
    let backend = SysfsBackend::new(temp_dir.path());

    backend.set_direction(89, PinMode::Output).unwrap();
    assert_eq!(read(temp_dir.path(), "gpio89/direction"), "out");
    backend.set_direction(89, PinMode::Input).unwrap();
    assert_eq!(read(temp_dir.path(), "gpio89/direction"), "in");

    backend.set_active_low(89, true).unwrap();
    assert_eq!(read(temp_dir.path(), "gpio89/active_low"), "1");
    backend.set_active_low(89, false).unwrap();
    assert_eq!(read(temp_dir.path(), "gpio89/active_low"), "0");
}

#[test]
fn value_reads_first_character() {
    let temp_dir = tempfile::tempdir().unwrap();
    fake_sysfs(temp_dir.path(), &[89]);
    let backend = SysfsBackend::new(temp_dir.path());
    let value = temp_dir.path().join("gpio89/value");

    fs::write(&value, "1\n").unwrap();
    assert_eq!(backend.read_value(89).unwrap(), 1);
    fs::write(&value, "0\n").unwrap();
    assert_eq!(backend.read_value(89).unwrap(), 0);
    fs::write(&value, "").unwrap();
    assert_eq!(backend.read_value(89).unwrap(), 0);

    backend.write_value(89, 1).unwrap();
    assert_eq!(read(temp_dir.path(), "gpio89/value"), "1");
    backend.write_value(89, 0).unwrap();
    assert_eq!(read(temp_dir.path(), "gpio89/value"), "0");

    assert!(backend.read_value(88).is_err());
}

#[test]
fn manager_drives_sysfs_files() {
    let temp_dir = tempfile::tempdir().unwrap();
    fake_sysfs(temp_dir.path(), &[89]);
    let config = GpioConfig {
        sysfs_root: temp_dir.path().to_path_buf(),
        boot_media: BootMedia::SdCard,
        ..GpioConfig::default()
    };
    let backend = Arc::new(SysfsBackend::new(config.sysfs_root.clone()));
    let manager = GpioManager::new(config, backend);

    // already present: no export request, not ours to unexport
    manager.configure_pin(2, PinMode::Output);
    assert_eq!(read(temp_dir.path(), "export"), "");
    assert_eq!(read(temp_dir.path(), "gpio89/direction"), "out");
    assert!(!manager.pin_status(2).unwrap().exported);

    manager.write_level(2, 1);
    assert_eq!(manager.read_level(2), 1);
    manager.set_polarity(2, Pull::PullUp);
    assert_eq!(read(temp_dir.path(), "gpio89/active_low"), "1");
    assert_eq!(manager.read_level(2), 0);

    manager.teardown_all();
    assert_eq!(read(temp_dir.path(), "unexport"), "");
    assert_eq!(manager.stats().io_failures, 0);
}

#[test]
fn manager_counts_missing_control_files() {
    let temp_dir = tempfile::tempdir().unwrap();
    fake_sysfs(temp_dir.path(), &[]);
    let config = GpioConfig {
        sysfs_root: temp_dir.path().to_path_buf(),
        boot_media: BootMedia::SdCard,
        ..GpioConfig::default()
    };
    let backend = Arc::new(SysfsBackend::new(config.sysfs_root.clone()));
    let manager = GpioManager::new(config, backend);

    // the export request is accepted but no kernel creates gpio88/
    manager.configure_pin(3, PinMode::Input);
    assert_eq!(read(temp_dir.path(), "export"), "88");
    assert!(manager.pin_status(3).unwrap().exported);
    assert_eq!(manager.stats().io_failures, 1);

    assert_eq!(manager.read_level(3), 0);
    assert_eq!(manager.stats().io_failures, 2);

    manager.teardown_all();
    assert_eq!(read(temp_dir.path(), "unexport"), "88");
}
