use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use watchlist_screen::index::RecordIndex;
use watchlist_screen::model::types::EntityRecord;

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

#[allow(dead_code)]
struct TestWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[allow(dead_code)]
pub struct EnvGuard {
    key: String,
    prev: Option<String>,
}

#[allow(dead_code)]
impl EnvGuard {
    pub fn set(key: &str, val: impl AsRef<str>) -> Self {
        let prev = std::env::var(key).ok();
        unsafe { std::env::set_var(key, val.as_ref()) };
        Self {
            key: key.to_string(),
            prev,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match &self.prev {
            Some(v) => unsafe { std::env::set_var(&self.key, v) },
            None => unsafe { std::env::remove_var(&self.key) },
        }
    }
}

#[allow(dead_code)]
const GIVEN: &[&str] = &[
    "Viktor", "Amal", "Rustam", "Ines", "Kofi", "Marek", "Leyla", "Tomas", "Hana", "Bilal",
];
#[allow(dead_code)]
const FAMILY: &[&str] = &[
    "Bout", "Zarate", "Karimov", "Oduya", "Lindqvist", "Barzani", "Horvath", "Quispe",
];

/// Deterministic watchlist of `count` records named `Given Family` with ids `wl-N`.
#[allow(dead_code)]
pub fn seeded_records(seed: u64, count: usize) -> Vec<EntityRecord> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let given = GIVEN.choose(&mut rng).copied().unwrap_or("Jane");
            let family = FAMILY.choose(&mut rng).copied().unwrap_or("Doe");
            let program = if rng.gen_bool(0.5) { "SDGT" } else { "UKRAINE-EO13662" };
            EntityRecord::new(
                format!("wl-{i}"),
                format!("{given} {family}"),
                serde_json::json!({ "program": program }),
            )
        })
        .collect()
}

#[allow(dead_code)]
pub fn index_of(names: &[(&str, &str)]) -> RecordIndex {
    let records = names
        .iter()
        .map(|(id, name)| EntityRecord::new(*id, *name, serde_json::Value::Null))
        .collect();
    RecordIndex::new(records).expect("unique ids")
}

/// Temporary JSON Lines watchlist file.
#[allow(dead_code)]
pub struct WatchlistFile {
    dir: TempDir,
    path: PathBuf,
}

#[allow(dead_code)]
impl WatchlistFile {
    pub fn new(names: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("watchlist.jsonl");
        let file = Self { dir, path };
        file.write(names);
        file
    }

    pub fn write(&self, names: &[(&str, &str)]) {
        let mut out = std::fs::File::create(&self.path).expect("create watchlist");
        for (id, name) in names {
            let line = serde_json::json!({
                "id": id,
                "name": name,
                "metadata": { "list": "test" },
            });
            writeln!(out, "{line}").expect("write record");
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}
