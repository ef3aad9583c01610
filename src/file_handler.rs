use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Write};
#[cfg(unix)]
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use flate2::write::GzEncoder;
use flate2::Compression;
use log::warn;

use crate::filter::Filter;
use crate::{Handler, Message};

const TMP_SUFFIX: &str = ".tmp";

/// Destination for the file handler's I/O diagnostics. Filesystem trouble is
/// reported here and absorbed; it never stops the handler.
pub type ErrorSink = Arc<dyn Fn(&str) + Send + Sync>;

fn diag(sink: &ErrorSink, msg: String) {
    sink.as_ref()(&msg);
}

/// Writes messages to a file, or to many files selected per message.
///
/// The filename template may contain the placeholders `%hostname%`,
/// `%programname%`, `%facility%` and `%severity%`; each distinct substitution
/// keeps its own open file. A blank or `-` field substitutes as `unknown`.
/// Messages are rendered through a [`Message::format`] template (usually
/// [`RFC_FORMAT`](crate::RFC_FORMAT)), one line per message.
///
/// With [`set_rotate`](FileHandler::set_rotate) the handler rotates logs
/// itself: on re-open the previous file is renamed aside and gzipped into a
/// numbered `.gz` series. Without it, files are opened for append and an
/// external logrotate can take over; either way
/// [`sig_hup`](Handler::sig_hup) closes everything so the next message
/// re-opens.
pub struct FileHandler {
    accept: Filter,
    mangler: FilenameMangler,
    files: HashMap<FileId, File>,
    format: String,
    retain: u32,
    truncate: bool,
    propagate_all: bool,
    sink: ErrorSink,
    rotations: Vec<JoinHandle<()>>,
}

impl FileHandler {
    pub fn new(filename: &str, format: &str) -> FileHandler {
        FileHandler {
            accept: Box::new(|_| true),
            mangler: FilenameMangler::new(filename),
            files: HashMap::new(),
            format: format.to_string(),
            retain: 0,
            truncate: false,
            propagate_all: false,
            sink: Arc::new(|msg| warn!("{msg}")),
            rotations: Vec::new(),
        }
    }

    /// Enables in-process log rotation, keeping `retain` compressed files
    /// (`file.log.1.gz` .. `file.log.N.gz`). Files are then opened with
    /// truncation and any pre-existing file is rotated aside first.
    ///
    /// A negative value disables rotation again: files are opened for append
    /// and rotation is left to an external tool.
    pub fn set_rotate(&mut self, retain: i32) {
        if retain < 0 {
            self.truncate = false;
            self.retain = 0;
        } else {
            self.truncate = true;
            self.retain = retain as u32;
        }
    }

    /// Replaces the accept filter deciding which messages are written.
    pub fn set_filter(&mut self, accept: Filter) {
        self.accept = accept;
    }

    /// When set, written messages also continue to downstream handlers.
    /// Rejected messages always do.
    pub fn set_propagate_all(&mut self, propagate_all: bool) {
        self.propagate_all = propagate_all;
    }

    /// Redirects I/O diagnostics away from the default `log::warn!`.
    pub fn set_error_sink<F>(&mut self, sink: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.sink = Arc::new(sink);
    }

    fn save(&mut self, m: &Message) {
        let id = self.mangler.id(m);
        if !self.files.contains_key(&id) {
            let name = self.mangler.name(m);
            match self.open_file(Path::new(&name)) {
                Ok(file) => {
                    self.files.insert(id.clone(), file);
                }
                Err(e) => {
                    diag(&self.sink, format!("open {name}: {e}"));
                    return;
                }
            }
        }
        let line = m.format(&self.format);
        if let Some(file) = self.files.get_mut(&id) {
            if let Err(e) = writeln!(file, "{line}") {
                diag(&self.sink, format!("write: {e}"));
            }
        }
    }

    fn open_file(&mut self, path: &Path) -> io::Result<File> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                create_dir(dir)?;
            }
        }

        if self.truncate && path.exists() {
            // Rename aside so compression can run off-thread while writes
            // continue into the fresh file.
            let tmp = suffixed(path, TMP_SUFFIX);
            match fs::rename(path, &tmp) {
                Ok(()) => {
                    let path = path.to_path_buf();
                    let retain = self.retain;
                    let sink = Arc::clone(&self.sink);
                    let handle = thread::Builder::new()
                        .name("syslog-rotate".to_string())
                        .spawn(move || rotate(&path, retain, &sink))?;
                    self.rotations.push(handle);
                }
                Err(e) => diag(
                    &self.sink,
                    format!("mv {} {}: {e}", path.display(), tmp.display()),
                ),
            }
        }

        let mut opts = OpenOptions::new();
        opts.write(true).create(true);
        if self.truncate {
            opts.truncate(true);
        } else {
            opts.append(true);
        }
        #[cfg(unix)]
        opts.mode(0o620);
        opts.open(path)
    }
}

impl Handler for FileHandler {
    fn handle(&mut self, msg: Message) -> Option<Message> {
        if (self.accept)(&msg) {
            self.save(&msg);
            if self.propagate_all {
                Some(msg)
            } else {
                None
            }
        } else {
            Some(msg)
        }
    }

    fn terminate(&mut self) {
        self.files.clear();
        for rotation in self.rotations.drain(..) {
            let _ = rotation.join();
        }
    }

    /// Closes every open file; the next write re-opens (and, with rotation
    /// enabled, rotates). This is how logrotate-style reload works.
    fn sig_hup(&mut self) {
        self.rotations.retain(|rotation| !rotation.is_finished());
        self.files.clear();
    }
}

fn create_dir(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o750);
    builder.create(dir)
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn gz_path(path: &Path, i: u32) -> PathBuf {
    suffixed(path, &format!(".{i}.gz"))
}

/// Shifts the `.gz` series up by one and compresses `<path>.tmp` into
/// `<path>.1.gz`. Any failure is reported and aborts the pass; a leftover
/// `.tmp` is consumed by the next rotation.
fn rotate(path: &Path, retain: u32, sink: &ErrorSink) {
    let mut older = gz_path(path, retain);
    if older.exists() {
        if let Err(e) = fs::remove_file(&older) {
            diag(sink, format!("rm {}: {e}", older.display()));
        }
    }
    for i in (1..retain).rev() {
        let old = gz_path(path, i);
        if old.exists() {
            if let Err(e) = fs::rename(&old, &older) {
                diag(sink, format!("mv {} {}: {e}", old.display(), older.display()));
            }
        }
        older = old;
    }

    let tmp = suffixed(path, TMP_SUFFIX);
    let input = match File::open(&tmp) {
        Ok(f) => f,
        Err(e) => {
            diag(sink, format!("open {}: {e}", tmp.display()));
            return;
        }
    };

    let target = gz_path(path, 1);
    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    opts.mode(0o620);
    let output = match opts.open(&target) {
        Ok(f) => f,
        Err(e) => {
            diag(sink, format!("create {}: {e}", target.display()));
            return;
        }
    };

    // level 5 is both quite good and quite fast
    let mut encoder = GzEncoder::new(output, Compression::new(5));
    if let Err(e) = io::copy(&mut BufReader::new(input), &mut encoder) {
        diag(sink, format!("gzip {}: {e}", target.display()));
        return;
    }
    if let Err(e) = encoder.finish() {
        diag(sink, format!("gzip {}: {e}", target.display()));
        return;
    }
    if let Err(e) = fs::remove_file(&tmp) {
        diag(sink, format!("rm {}: {e}", tmp.display()));
    }
}

//-------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
struct FileId {
    hostname: String,
    application: String,
    facility: String,
    severity: String,
}

const HOSTNAME_PLACEHOLDER: &str = "%hostname%";
const PROGRAM_PLACEHOLDER: &str = "%programname%";
const FACILITY_PLACEHOLDER: &str = "%facility%";
const SEVERITY_PLACEHOLDER: &str = "%severity%";

/// Expands filename-template placeholders and keys the open-file table by
/// the placeholder values actually used.
struct FilenameMangler {
    template: String,
    has_hostname: bool,
    has_application: bool,
    has_facility: bool,
    has_severity: bool,
}

impl FilenameMangler {
    fn new(template: &str) -> FilenameMangler {
        FilenameMangler {
            has_hostname: template.contains(HOSTNAME_PLACEHOLDER),
            has_application: template.contains(PROGRAM_PLACEHOLDER),
            has_facility: template.contains(FACILITY_PLACEHOLDER),
            has_severity: template.contains(SEVERITY_PLACEHOLDER),
            template: template.to_string(),
        }
    }

    fn id(&self, m: &Message) -> FileId {
        let mut id = FileId::default();
        if self.has_hostname {
            id.hostname = m.hostname.clone();
        }
        if self.has_application {
            id.application = m.application.clone();
        }
        if self.has_facility {
            id.facility = m.facility.as_str().to_string();
        }
        if self.has_severity {
            id.severity = m.severity.as_str().to_string();
        }
        id
    }

    fn name(&self, m: &Message) -> String {
        let mut name = self.template.clone();
        if self.has_hostname {
            name = name.replace(HOSTNAME_PLACEHOLDER, if_blank(&m.hostname, "unknown"));
        }
        if self.has_application {
            name = name.replace(PROGRAM_PLACEHOLDER, if_blank(&m.application, "unknown"));
        }
        if self.has_facility {
            name = name.replace(FACILITY_PLACEHOLDER, if_blank(m.facility.as_str(), "unknown"));
        }
        if self.has_severity {
            name = name.replace(SEVERITY_PLACEHOLDER, if_blank(m.severity.as_str(), "unknown"));
        }
        name
    }
}

fn if_blank<'a>(s: &'a str, default: &'a str) -> &'a str {
    match s {
        "" | "-" => default,
        _ => s,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;

    use super::*;
    use crate::{Facility, Severity};

    fn msg(hostname: &str, application: &str, content: &str) -> Message {
        Message {
            hostname: hostname.to_string(),
            application: application.to_string(),
            content: content.to_string(),
            ..Message::default()
        }
    }

    fn strict_sink() -> ErrorSink {
        Arc::new(|msg| panic!("unexpected I/O diagnostic: {msg}"))
    }

    #[test]
    fn mangler_substitutes_and_keys() {
        let fm = FilenameMangler::new("/var/log/%hostname%/%facility%/%programname%-%severity%.log");
        let m = Message {
            hostname: "myhost".to_string(),
            application: "myapp".to_string(),
            facility: Facility::Daemon,
            severity: Severity::Warning,
            ..Message::default()
        };
        assert_eq!(
            fm.id(&m),
            FileId {
                hostname: "myhost".to_string(),
                application: "myapp".to_string(),
                facility: "daemon".to_string(),
                severity: "warning".to_string(),
            }
        );
        assert_eq!(fm.name(&m), "/var/log/myhost/daemon/myapp-warning.log");
        assert_eq!(
            fm.name(&Message::default()),
            "/var/log/unknown/kern/unknown-emerg.log"
        );
    }

    #[test]
    fn rotation_keeps_retain_files() {
        let dir = tempfile::tempdir().unwrap();
        let filename = dir.path().join("temp.log");
        let sink = strict_sink();

        for contents in ["this is file 1\n", "this is file 2\n", "this is file 3\n"] {
            fs::write(suffixed(&filename, TMP_SUFFIX), contents).unwrap();
            rotate(&filename, 2, &sink);
        }

        assert!(!filename.exists());
        assert!(!suffixed(&filename, TMP_SUFFIX).exists());
        assert!(gz_path(&filename, 1).exists());
        assert!(gz_path(&filename, 2).exists());
        assert!(!gz_path(&filename, 3).exists());

        let mut contents = String::new();
        GzDecoder::new(File::open(gz_path(&filename, 1)).unwrap())
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "this is file 3\n");
        contents.clear();
        GzDecoder::new(File::open(gz_path(&filename, 2)).unwrap())
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "this is file 2\n");
    }

    #[test]
    fn partitions_messages_by_template() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("%hostname%/%programname%.log");
        let mut h = FileHandler::new(template.to_str().unwrap(), "%C");
        h.set_error_sink(|msg| panic!("unexpected I/O diagnostic: {msg}"));

        assert!(h.handle(msg("web1", "nginx", "hello")).is_none());
        assert!(h.handle(msg("web2", "nginx", "salut")).is_none());
        assert!(h.handle(msg("web1", "nginx", "again")).is_none());
        h.terminate();

        let read = |p: PathBuf| fs::read_to_string(p).unwrap();
        assert_eq!(read(dir.path().join("web1/nginx.log")), "hello\nagain\n");
        assert_eq!(read(dir.path().join("web2/nginx.log")), "salut\n");
    }

    #[test]
    fn blank_fields_become_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("%hostname%-%programname%.log");
        let mut h = FileHandler::new(template.to_str().unwrap(), "%C");
        h.handle(msg("", "-", "x"));
        h.terminate();
        assert!(dir.path().join("unknown-unknown.log").exists());
    }

    #[test]
    fn rejected_messages_propagate() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("out.log");
        let mut h = FileHandler::new(template.to_str().unwrap(), "%C");
        h.set_filter(Box::new(|m| m.content == "keep"));

        assert!(h.handle(msg("h", "a", "keep")).is_none());
        let passed = h.handle(msg("h", "a", "drop")).unwrap();
        assert_eq!(passed.content, "drop");

        h.set_propagate_all(true);
        let kept = h.handle(msg("h", "a", "keep")).unwrap();
        assert_eq!(kept.content, "keep");
        h.terminate();

        assert_eq!(
            fs::read_to_string(dir.path().join("out.log")).unwrap(),
            "keep\nkeep\n"
        );
    }

    #[test]
    fn sighup_reopens_and_rotates() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.log");
        let mut h = FileHandler::new(file.to_str().unwrap(), "%C");
        h.set_error_sink(|msg| panic!("unexpected I/O diagnostic: {msg}"));
        h.set_rotate(1);

        h.handle(msg("h", "a", "one"));
        h.sig_hup();
        h.handle(msg("h", "a", "two"));
        h.terminate();

        assert_eq!(fs::read_to_string(&file).unwrap(), "two\n");
        let mut contents = String::new();
        GzDecoder::new(File::open(gz_path(&file, 1)).unwrap())
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "one\n");
    }

    #[test]
    fn append_mode_survives_sighup() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.log");
        let mut h = FileHandler::new(file.to_str().unwrap(), "%C");

        h.handle(msg("h", "a", "one"));
        h.sig_hup();
        h.handle(msg("h", "a", "two"));
        h.terminate();

        assert_eq!(fs::read_to_string(&file).unwrap(), "one\ntwo\n");
    }
}
