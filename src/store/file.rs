//! Durable file-backed store
//!
//! One directory holds every topic. A topic maps to three append-only log
//! files and a cursor file:
//!
//! ```text
//! <name>-<hash>.main.log      the FIFO
//! <name>-<hash>.delayed.log   values parked by Dack, due-time in the record header
//! <name>-<hash>.dlq.log       dead-lettered values, write-only
//! <name>-<hash>.cursor        8-byte little-endian main cursor
//! ```
//!
//! Log files start with an 8-byte signature followed by the full topic
//! name, so the real name survives filename sanitisation. Records are
//! signature-framed with an optional fixed header (delayed records carry
//! their due-time there) and a u64 length-prefixed payload. Appends are
//! `sync_data`'d before returning; cursor writes go through a temp file
//! and rename.
//!
//! Promotion appends the due values to the main log first, then compacts
//! the delayed log. A crash between the two re-delivers on restart, which
//! at-least-once delivery permits.

use crate::error::{QueueError, Result};
use crate::store::{Store, StoreOptions};
use crate::types::{now_millis, DelayedEntry, StoreInfo, Value};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::RwLock;

/// 'MINIQLOG' signature at the head of every partition file
const LOG_SIGNATURE: [u8; 8] = *b"MINIQLOG";

/// 'MINREC' signature preceding every record
const REC_SIGNATURE: [u8; 6] = *b"MINREC";

/// Record-header length for delayed entries (due-time millis, u64 le)
const DUE_HEADER_LEN: u16 = 8;

/// Durable implementation of [`Store`]
pub struct FileStore {
    dir: PathBuf,
    options: StoreOptions,
    inner: RwLock<FileInner>,
}

#[derive(Default)]
struct FileInner {
    topics: HashMap<String, FileTopic>,
    closed: bool,
}

struct FileTopic {
    /// Path prefix for this topic's files, e.g. `<dir>/orders-13fa…`
    base: PathBuf,
    /// Append handle for the main log
    main: File,
    /// In-memory mirror of the main partition
    values: Vec<Value>,
    cursor: usize,
    delayed: Vec<DelayedEntry>,
    dlq_len: usize,
    head_nacks: u32,
}

impl FileStore {
    /// Open (or create) a store rooted at `dir` with default options
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_options(dir, StoreOptions::default())
    }

    /// Open (or create) a store rooted at `dir`
    ///
    /// Scans the directory, recovers each topic's partitions and cursor,
    /// and fails with `Corrupted` when a log file's signature is wrong.
    pub fn open_with_options(dir: impl Into<PathBuf>, options: StoreOptions) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut topics = HashMap::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let Some(filename) = entry.file_name().to_str().map(String::from) else {
                continue;
            };
            let Some(stem) = filename.strip_suffix(".main.log") else {
                continue;
            };

            let base = dir.join(stem);
            let topic = load_topic(&base)?;
            let name = topic_name_from_header(&main_path(&base))?;
            tracing::debug!(
                topic = %name,
                messages = topic.values.len(),
                cursor = topic.cursor,
                delayed = topic.delayed.len(),
                "Recovered topic"
            );
            topics.insert(name, topic);
        }

        tracing::info!(path = %dir.display(), topics = topics.len(), "Store opened");

        Ok(Self {
            dir,
            options,
            inner: RwLock::new(FileInner {
                topics,
                closed: false,
            }),
        })
    }

    /// Number of dead-lettered values on a topic (test/inspection hook)
    pub async fn dead_letter_count(&self, topic: &str) -> usize {
        let inner = self.inner.read().await;
        inner.topics.get(topic).map(|t| t.dlq_len).unwrap_or(0)
    }
}

#[async_trait]
impl Store for FileStore {
    async fn append(&self, topic: &str, value: Value) -> Result<u64> {
        let mut inner = self.inner.write().await;
        inner.ensure_open()?;
        let state = inner.get_or_create(&self.dir, topic)?;

        write_record(&mut state.main, None, &value.raw)?;
        state.main.sync_data()?;
        state.values.push(value);
        Ok((state.values.len() - 1) as u64)
    }

    async fn get_next(&self, topic: &str) -> Result<(Value, u64)> {
        let inner = self.inner.read().await;
        inner.ensure_open()?;
        let state = inner
            .topics
            .get(topic)
            .ok_or_else(|| QueueError::Empty(topic.to_string()))?;
        match state.values.get(state.cursor) {
            Some(value) => Ok((value.clone(), state.cursor as u64)),
            None => Err(QueueError::Empty(topic.to_string())),
        }
    }

    async fn ack(&self, topic: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.ensure_open()?;
        let state = inner.head_state(topic)?;
        write_cursor(&state.base, (state.cursor + 1) as u64)?;
        state.cursor += 1;
        state.head_nacks = 0;
        Ok(())
    }

    async fn nack(&self, topic: &str) -> Result<()> {
        let max_nacks = self.options.max_nacks;
        let mut inner = self.inner.write().await;
        inner.ensure_open()?;
        let state = inner.head_state(topic)?;
        state.head_nacks += 1;

        if let Some(max) = max_nacks {
            if state.head_nacks >= max {
                let value = state.values[state.cursor].clone();
                append_to_dlq(state, topic, &value)?;
                write_cursor(&state.base, (state.cursor + 1) as u64)?;
                state.cursor += 1;
                state.head_nacks = 0;
                tracing::warn!(topic, "head value dead-lettered after {} nacks", max);
            }
        }
        Ok(())
    }

    async fn back(&self, topic: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.ensure_open()?;
        if let Some(state) = inner.topics.get_mut(topic) {
            let rewound = state.cursor.saturating_sub(1);
            write_cursor(&state.base, rewound as u64)?;
            state.cursor = rewound;
            state.head_nacks = 0;
        }
        Ok(())
    }

    async fn dack(&self, topic: &str, value: Value, delay: Duration) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.ensure_open()?;
        let state = inner.head_state(topic)?;

        let entry = DelayedEntry::new(value, delay);
        let mut delayed = OpenOptions::new()
            .create(true)
            .append(true)
            .open(delayed_path(&state.base))?;
        ensure_file_header(&mut delayed, topic)?;
        write_record(&mut delayed, Some(entry.due_at), &entry.value.raw)?;
        delayed.sync_data()?;

        write_cursor(&state.base, (state.cursor + 1) as u64)?;
        state.cursor += 1;
        state.head_nacks = 0;
        state.delayed.push(entry);
        Ok(())
    }

    async fn dead_letter(&self, topic: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.ensure_open()?;
        let state = inner.head_state(topic)?;
        let value = state.values[state.cursor].clone();
        append_to_dlq(state, topic, &value)?;
        write_cursor(&state.base, (state.cursor + 1) as u64)?;
        state.cursor += 1;
        state.head_nacks = 0;
        Ok(())
    }

    async fn promote_due(&self) -> Result<Vec<String>> {
        let now = now_millis();
        let mut inner = self.inner.write().await;
        inner.ensure_open()?;

        let mut promoted_topics = Vec::new();
        for (name, state) in inner.topics.iter_mut() {
            let mut due: Vec<DelayedEntry> = Vec::new();
            state.delayed.retain(|entry| {
                if entry.is_due(now) {
                    due.push(entry.clone());
                    false
                } else {
                    true
                }
            });
            if due.is_empty() {
                continue;
            }
            due.sort_by_key(|entry| entry.due_at);

            // Main log first, then compact the delayed log. A crash in
            // between leaves the entry in both; restart re-delivers it.
            for entry in &due {
                write_record(&mut state.main, None, &entry.value.raw)?;
            }
            state.main.sync_data()?;
            state.values.extend(due.into_iter().map(|entry| entry.value));

            rewrite_delayed_log(&state.base, name, &state.delayed)?;
            promoted_topics.push(name.clone());
        }
        Ok(promoted_topics)
    }

    async fn topics(&self) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        inner.ensure_open()?;
        let mut names: Vec<String> = inner.topics.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn info(&self) -> Result<StoreInfo> {
        let inner = self.inner.read().await;
        inner.ensure_open()?;
        let mut info = StoreInfo {
            topics: inner.topics.len(),
            ..Default::default()
        };
        for state in inner.topics.values() {
            info.messages += (state.values.len() - state.cursor.min(state.values.len())) as u64;
            info.delayed += state.delayed.len() as u64;
            info.dead_lettered += state.dlq_len as u64;
        }
        Ok(info)
    }

    async fn close(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.closed {
            return Ok(());
        }
        for state in inner.topics.values_mut() {
            state.main.sync_data()?;
        }
        inner.closed = true;
        tracing::info!(path = %self.dir.display(), "Store closed");
        Ok(())
    }
}

impl FileInner {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(QueueError::Closed);
        }
        Ok(())
    }

    fn get_or_create(&mut self, dir: &Path, topic: &str) -> Result<&mut FileTopic> {
        if !self.topics.contains_key(topic) {
            let base = topic_base(dir, topic);
            let mut main = OpenOptions::new()
                .create(true)
                .append(true)
                .open(main_path(&base))?;
            ensure_file_header(&mut main, topic)?;
            self.topics.insert(
                topic.to_string(),
                FileTopic {
                    base,
                    main,
                    values: Vec::new(),
                    cursor: 0,
                    delayed: Vec::new(),
                    dlq_len: 0,
                    head_nacks: 0,
                },
            );
        }
        Ok(self
            .topics
            .get_mut(topic)
            .ok_or_else(|| QueueError::Empty(topic.to_string()))?)
    }

    /// Topic state with a value guaranteed at the cursor
    fn head_state(&mut self, topic: &str) -> Result<&mut FileTopic> {
        let state = self
            .topics
            .get_mut(topic)
            .ok_or_else(|| QueueError::Empty(topic.to_string()))?;
        if state.cursor >= state.values.len() {
            return Err(QueueError::Empty(topic.to_string()));
        }
        Ok(state)
    }
}

// ── paths ────────────────────────────────────────────────────────

fn topic_base(dir: &Path, topic: &str) -> PathBuf {
    let mut hasher = DefaultHasher::new();
    topic.hash(&mut hasher);
    let sanitized: String = topic
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .take(20)
        .collect();
    dir.join(format!("{}-{:016x}", sanitized, hasher.finish()))
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut s = base.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

fn main_path(base: &Path) -> PathBuf {
    with_suffix(base, ".main.log")
}

fn delayed_path(base: &Path) -> PathBuf {
    with_suffix(base, ".delayed.log")
}

fn dlq_path(base: &Path) -> PathBuf {
    with_suffix(base, ".dlq.log")
}

fn cursor_path(base: &Path) -> PathBuf {
    with_suffix(base, ".cursor")
}

// ── framing ──────────────────────────────────────────────────────

/// Write the file header if the file is empty
fn ensure_file_header(file: &mut File, topic: &str) -> Result<()> {
    if file.metadata()?.len() > 0 {
        return Ok(());
    }
    file.write_all(&LOG_SIGNATURE)?;
    let name = topic.as_bytes();
    file.write_all(&(name.len() as u16).to_le_bytes())?;
    file.write_all(name)?;
    Ok(())
}

fn write_record(file: &mut File, due_at: Option<u64>, content: &[u8]) -> Result<()> {
    file.write_all(&REC_SIGNATURE)?;
    match due_at {
        Some(due) => {
            file.write_all(&DUE_HEADER_LEN.to_le_bytes())?;
            file.write_all(&due.to_le_bytes())?;
        }
        None => file.write_all(&0u16.to_le_bytes())?,
    }
    file.write_all(&(content.len() as u64).to_le_bytes())?;
    file.write_all(content)?;
    Ok(())
}

/// Read the topic name stored in a log file's header
fn topic_name_from_header(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;

    let mut signature = [0u8; 8];
    file.read_exact(&mut signature)?;
    if signature != LOG_SIGNATURE {
        return Err(QueueError::Corrupted(format!(
            "bad log signature in {}",
            path.display()
        )));
    }

    let mut len_bytes = [0u8; 2];
    file.read_exact(&mut len_bytes)?;
    let len = u16::from_le_bytes(len_bytes) as usize;

    let mut name = vec![0u8; len];
    file.read_exact(&mut name)?;
    String::from_utf8(name)
        .map_err(|_| QueueError::Corrupted(format!("non-UTF-8 topic name in {}", path.display())))
}

/// Read every record in a log file
///
/// A torn record at the tail (partial write from a crash) ends the scan;
/// everything before it is intact because appends are signature-framed.
fn read_records(path: &Path) -> Result<Vec<(Option<u64>, Bytes)>> {
    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();

    let mut signature = [0u8; 8];
    file.read_exact(&mut signature)?;
    if signature != LOG_SIGNATURE {
        return Err(QueueError::Corrupted(format!(
            "bad log signature in {}",
            path.display()
        )));
    }
    let mut len_bytes = [0u8; 2];
    file.read_exact(&mut len_bytes)?;
    let mut skip = vec![0u8; u16::from_le_bytes(len_bytes) as usize];
    file.read_exact(&mut skip)?;

    let mut records = Vec::new();
    loop {
        let mut rec_sig = [0u8; 6];
        match file.read_exact(&mut rec_sig) {
            Ok(()) if rec_sig == REC_SIGNATURE => {}
            _ => break,
        }

        let mut header_len_bytes = [0u8; 2];
        if file.read_exact(&mut header_len_bytes).is_err() {
            break;
        }
        let header_len = u16::from_le_bytes(header_len_bytes);

        let due_at = if header_len == DUE_HEADER_LEN {
            let mut due_bytes = [0u8; 8];
            if file.read_exact(&mut due_bytes).is_err() {
                break;
            }
            Some(u64::from_le_bytes(due_bytes))
        } else {
            let mut header = vec![0u8; header_len as usize];
            if file.read_exact(&mut header).is_err() {
                break;
            }
            None
        };

        let mut content_len_bytes = [0u8; 8];
        if file.read_exact(&mut content_len_bytes).is_err() {
            break;
        }
        let content_len = u64::from_le_bytes(content_len_bytes);

        // A length field the file cannot possibly hold is corruption,
        // not a torn tail; refuse it before allocating.
        if content_len > file_len {
            return Err(QueueError::Corrupted(format!(
                "record length {} exceeds file size {} in {}",
                content_len,
                file_len,
                path.display()
            )));
        }

        let mut content = vec![0u8; content_len as usize];
        if file.read_exact(&mut content).is_err() {
            break;
        }

        records.push((due_at, Bytes::from(content)));
    }

    Ok(records)
}

// ── cursor ───────────────────────────────────────────────────────

/// Durable cursor write: temp file, sync, rename
fn write_cursor(base: &Path, cursor: u64) -> Result<()> {
    let path = cursor_path(base);
    let tmp = with_suffix(base, ".cursor.tmp");

    let mut file = File::create(&tmp)?;
    file.write_all(&cursor.to_le_bytes())?;
    file.sync_data()?;
    fs::rename(&tmp, &path)?;
    Ok(())
}

fn read_cursor(base: &Path) -> Result<u64> {
    let path = cursor_path(base);
    if !path.exists() {
        return Ok(0);
    }
    let mut file = File::open(&path)?;
    let mut bytes = [0u8; 8];
    file.read_exact(&mut bytes).map_err(|_| {
        QueueError::Corrupted(format!("truncated cursor file {}", path.display()))
    })?;
    Ok(u64::from_le_bytes(bytes))
}

// ── recovery & compaction ────────────────────────────────────────

fn load_topic(base: &Path) -> Result<FileTopic> {
    let values: Vec<Value> = read_records(&main_path(base))?
        .into_iter()
        .map(|(_, raw)| Value::from(raw))
        .collect();

    let delayed = if delayed_path(base).exists() {
        read_records(&delayed_path(base))?
            .into_iter()
            .filter_map(|(due_at, raw)| {
                due_at.map(|due_at| DelayedEntry {
                    due_at,
                    value: Value::from(raw),
                })
            })
            .collect()
    } else {
        Vec::new()
    };

    let dlq_len = if dlq_path(base).exists() {
        read_records(&dlq_path(base))?.len()
    } else {
        0
    };

    let cursor = (read_cursor(base)? as usize).min(values.len());

    let main = OpenOptions::new().append(true).open(main_path(base))?;

    Ok(FileTopic {
        base: base.to_path_buf(),
        main,
        values,
        cursor,
        delayed,
        dlq_len,
        head_nacks: 0,
    })
}

fn append_to_dlq(state: &mut FileTopic, topic: &str, value: &Value) -> Result<()> {
    let mut dlq = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dlq_path(&state.base))?;
    ensure_file_header(&mut dlq, topic)?;
    write_record(&mut dlq, None, &value.raw)?;
    dlq.sync_data()?;
    state.dlq_len += 1;
    Ok(())
}

/// Replace the delayed log with the surviving entries, atomically
fn rewrite_delayed_log(base: &Path, topic: &str, remaining: &[DelayedEntry]) -> Result<()> {
    let path = delayed_path(base);
    if remaining.is_empty() {
        if path.exists() {
            fs::remove_file(&path)?;
        }
        return Ok(());
    }

    let tmp = with_suffix(base, ".delayed.tmp");
    let mut file = File::create(&tmp)?;
    ensure_file_header(&mut file, topic)?;
    for entry in remaining {
        write_record(&mut file, Some(entry.due_at), &entry.value.raw)?;
    }
    file.sync_data()?;
    fs::rename(&tmp, &path)?;
    Ok(())
}
