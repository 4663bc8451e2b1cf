//! Finds `usblp` device nodes and resolves their USB serial numbers via sysfs.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::bus::FoundPrinter;

pub(crate) const DEFAULT_DEV_DIR: &str = "/dev/usb";
pub(crate) const DEFAULT_SYSFS_CLASS_DIR: &str = "/sys/class/usbmisc";

const LP_PREFIX: &str = "lp";
const SERIAL_FILE: &str = "serial";

/// Lists `lp*` nodes under `dev_dir` that have a resolvable serial number.
///
/// A missing `dev_dir` means no printers, not an error.
pub(crate) fn scan(dev_dir: &Path, sysfs_class_dir: &Path) -> Vec<FoundPrinter> {
    let Ok(entries) = fs::read_dir(dev_dir) else {
        debug!(dir = %dev_dir.display(), "no usb device directory");
        return Vec::new();
    };

    let mut nodes: Vec<String> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| is_lp_node(name))
        .collect();
    nodes.sort();

    nodes
        .into_iter()
        .filter_map(|name| {
            let path = dev_dir.join(&name);
            match serial_for(&sysfs_class_dir.join(&name)) {
                Some(serial) => Some(FoundPrinter::new(serial, path.display().to_string())),
                None => {
                    warn!(path = %path.display(), "could not resolve printer serial");
                    None
                }
            }
        })
        .collect()
}

fn is_lp_node(name: &str) -> bool {
    name.strip_prefix(LP_PREFIX)
        .is_some_and(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
}

/// Climbs from the class entry to the USB interface directory (`1-1.2:1.0`)
/// and reads `serial` from its parent device directory.
fn serial_for(class_entry: &Path) -> Option<String> {
    let mut current: PathBuf = fs::canonicalize(class_entry).ok()?;
    while !current
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.contains(':'))
    {
        current = current.parent()?.to_path_buf();
    }

    let serial = fs::read_to_string(current.parent()?.join(SERIAL_FILE)).ok()?;
    let serial = serial.trim();
    (!serial.is_empty()).then(|| serial.to_string())
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::symlink;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    struct SysfsFixture {
        root: tempfile::TempDir,
    }

    impl SysfsFixture {
        fn new() -> Self {
            let root = tempfile::tempdir().expect("temp dir should be created");
            fs::create_dir_all(root.path().join("dev/usb")).expect("dev dir");
            fs::create_dir_all(root.path().join("class/usbmisc")).expect("class dir");
            Self { root }
        }

        fn add_printer(&self, node: &str, port: &str, serial: Option<&str>) {
            let device_dir = self.root.path().join("devices/usb1").join(port);
            let node_dir = device_dir.join(format!("{port}:1.0/usbmisc/{node}"));
            fs::create_dir_all(&node_dir).expect("node dir");
            if let Some(serial) = serial {
                fs::write(device_dir.join("serial"), format!("{serial}\n")).expect("serial");
            }
            symlink(&node_dir, self.class_dir().join(node)).expect("class link");
            fs::write(self.dev_dir().join(node), b"").expect("device node");
        }

        fn dev_dir(&self) -> PathBuf {
            self.root.path().join("dev/usb")
        }

        fn class_dir(&self) -> PathBuf {
            self.root.path().join("class/usbmisc")
        }
    }

    #[test]
    fn scan_resolves_serials_in_node_order() {
        let fixture = SysfsFixture::new();
        fixture.add_printer("lp1", "1-1.3", Some("000G9Z123456"));
        fixture.add_printer("lp0", "1-1.2", Some("000F1A654321"));

        let found = scan(&fixture.dev_dir(), &fixture.class_dir());

        let serials: Vec<&str> = found.iter().map(FoundPrinter::serial).collect();
        assert_eq!(vec!["000F1A654321", "000G9Z123456"], serials);
        assert!(found[0].path().ends_with("dev/usb/lp0"));
    }

    #[test]
    fn scan_skips_nodes_without_serial() {
        let fixture = SysfsFixture::new();
        fixture.add_printer("lp0", "1-1.2", None);

        assert!(scan(&fixture.dev_dir(), &fixture.class_dir()).is_empty());
    }

    #[test]
    fn missing_dev_dir_is_empty() {
        let found = scan(Path::new("/nonexistent/dev/usb"), Path::new("/nonexistent"));
        assert!(found.is_empty());
    }

    #[rstest]
    #[case("lp0", true)]
    #[case("lp12", true)]
    #[case("lp", false)]
    #[case("lpx", false)]
    #[case("hiddev0", false)]
    fn lp_node_names(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(expected, is_lp_node(name));
    }
}
