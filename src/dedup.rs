//! Content deduplication and conversation assembly.
//!
//! Records from every export are hashed in parallel, grouped by content,
//! and one file per group is copied to the media directory. Conversations
//! are then rebuilt around the copied files: a file shared once becomes a
//! single entry, a file shared several times becomes one merged entry in the
//! primary's conversation listing every occurrence.
//!
//! Worker threads only return values; every fold into groups, statistics and
//! conversations happens on the calling thread.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File};
use std::hash::Hasher;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::{debug, error, info, warn};
use twox_hash::XxHash64;

use crate::error::Result;
use crate::failure_tracker::FailureTracker;
use crate::logging::OperationTimer;
use crate::media::ExtensionCorrector;
use crate::metrics::RunStats;
use crate::models::{AttachmentRecord, Conversation, MergedEntry, MessageEntry, SingleEntry};

/// Default read size while hashing.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Stream a file through xxHash64 (seed 0) and return it as 16 hex digits.
pub fn hash_file(path: &Path, chunk_size: usize) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = XxHash64::with_seed(0);
    let mut buffer = vec![0_u8; chunk_size.max(1)];

    loop {
        let read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.write(&buffer[..read]);
    }

    Ok(format!("{:016x}", hasher.finish()))
}

/// A record together with its position in the combined input.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMember {
    /// Index in the input, captured before any parallel work
    pub index: usize,
    /// The record, with `content_hash` set
    pub record: AttachmentRecord,
}

/// Records sharing one content hash. The first member is the primary.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentGroup {
    hash: String,
    members: Vec<GroupMember>,
}

impl ContentGroup {
    /// Build a group and order its members: earliest timestamp first,
    /// missing timestamps last, ties by input index.
    ///
    /// Returns `None` for an empty member list.
    #[must_use]
    pub fn new(hash: String, mut members: Vec<GroupMember>) -> Option<Self> {
        if members.is_empty() {
            return None;
        }
        members.sort_by_key(|m| (m.record.sent_at.is_none(), m.record.sent_at, m.index));
        Some(Self { hash, members })
    }

    /// Shared content hash
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Members, primary first
    #[must_use]
    pub fn members(&self) -> &[GroupMember] {
        &self.members
    }

    /// The member whose file and name are kept
    #[must_use]
    pub fn primary(&self) -> &GroupMember {
        &self.members[0]
    }

    /// Number of occurrences
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always false; groups are never empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Group hashed members by content, ordered by primary input index.
#[must_use]
pub fn group_by_hash(members: Vec<GroupMember>) -> Vec<ContentGroup> {
    let mut by_hash: HashMap<String, Vec<GroupMember>> = HashMap::new();
    for member in members {
        let Some(hash) = member.record.content_hash.clone() else {
            continue;
        };
        by_hash.entry(hash).or_default().push(member);
    }

    let mut groups: Vec<ContentGroup> = by_hash
        .into_iter()
        .filter_map(|(hash, members)| ContentGroup::new(hash, members))
        .collect();
    groups.sort_by_key(|g| g.primary().index);
    groups
}

/// Append `_1`, `_2`, ... to the stem until the name is free both on disk
/// and among names already handed out this run.
#[must_use]
pub fn unique_file_name(file_name: &str, directory: &Path, assigned: &HashSet<String>) -> String {
    let taken = |name: &str| assigned.contains(name) || directory.join(name).exists();
    if !taken(file_name) {
        return file_name.to_string();
    }

    let path = Path::new(file_name);
    let stem = path.file_stem().map_or_else(String::new, |s| s.to_string_lossy().into_owned());
    let suffix = path
        .extension()
        .map_or_else(String::new, |e| format!(".{}", e.to_string_lossy()));

    let mut counter = 1_usize;
    loop {
        let candidate = format!("{stem}_{counter}{suffix}");
        if !taken(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

/// Copy of one group's primary into the media directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyTask {
    /// Position of the group in the grouped list
    pub group: usize,
    /// File being copied
    pub source: PathBuf,
    /// Output file name under the media directory
    pub file_name: String,
    /// Full destination path
    pub destination: PathBuf,
}

/// Everything the deduplication stage produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupOutcome {
    /// Conversations keyed by identifier
    pub conversations: BTreeMap<String, Conversation>,
    /// Content hash -> output file name, for copied groups
    pub content_hashes: BTreeMap<String, String>,
}

/// Hashes, groups, copies and assembles conversations.
pub struct Deduplicator<'a> {
    pool: ThreadPool,
    corrector: &'a dyn ExtensionCorrector,
    media_dir: PathBuf,
    chunk_size: usize,
}

impl<'a> Deduplicator<'a> {
    /// Create a deduplicator writing into `media_dir` with `workers` threads.
    pub fn new(
        media_dir: &Path,
        workers: usize,
        chunk_size: usize,
        corrector: &'a dyn ExtensionCorrector,
    ) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("memoria-io-{i}"))
            .build()?;

        Ok(Self {
            pool,
            corrector,
            media_dir: media_dir.to_path_buf(),
            chunk_size,
        })
    }

    /// Run every phase over the combined records of all exports.
    pub fn run(
        &self,
        records: Vec<AttachmentRecord>,
        stats: &mut RunStats,
        failures: &mut FailureTracker,
    ) -> Result<DedupOutcome> {
        fs::create_dir_all(&self.media_dir)?;

        let timer = OperationTimer::new("hash");
        let hashed = self.hash_records(records, stats, failures);
        timer.finish();

        let groups = group_by_hash(hashed);
        info!(groups = groups.len(), "Grouped attachments by content");

        let tasks = self.plan_copies(&groups, stats);

        let timer = OperationTimer::new("copy");
        let results = self.copy_files(&tasks);
        timer.finish();

        Ok(fold_copies(&groups, &tasks, results, stats, failures))
    }

    /// Phase 1: hash every record on the pool. Order follows the input.
    fn hash_records(
        &self,
        records: Vec<AttachmentRecord>,
        stats: &mut RunStats,
        failures: &mut FailureTracker,
    ) -> Vec<GroupMember> {
        let chunk_size = self.chunk_size;
        let hashed: Vec<(AttachmentRecord, io::Result<String>)> = self.pool.install(|| {
            records
                .into_par_iter()
                .map(|record| {
                    let hash = hash_file(&record.source_path, chunk_size);
                    (record, hash)
                })
                .collect()
        });

        let mut members = Vec::with_capacity(hashed.len());
        for (index, (mut record, hash)) in hashed.into_iter().enumerate() {
            match hash {
                Ok(hash) => {
                    record.content_hash = Some(hash);
                    members.push(GroupMember { index, record });
                }
                Err(e) => {
                    warn!(path = %record.source_path.display(), error = %e, "Could not hash file");
                    stats.hash_failures += 1;
                    let mut context = BTreeMap::new();
                    context.insert("source_export".to_string(), record.source_export.clone());
                    failures.add_processing_failure(&record.source_path, "hash failed", &e.to_string(), context);
                }
            }
        }
        members
    }

    /// Phase 3: choose output names, correcting extensions and avoiding collisions.
    fn plan_copies(&self, groups: &[ContentGroup], stats: &mut RunStats) -> Vec<CopyTask> {
        let mut assigned = HashSet::new();
        let mut tasks = Vec::with_capacity(groups.len());

        for (index, group) in groups.iter().enumerate() {
            let primary = &group.primary().record;
            let base_name = self.output_name(primary, group.hash(), stats);
            let file_name = unique_file_name(&base_name, &self.media_dir, &assigned);
            assigned.insert(file_name.clone());

            tasks.push(CopyTask {
                group: index,
                source: primary.source_path.clone(),
                destination: self.media_dir.join(&file_name),
                file_name,
            });
        }

        tasks
    }

    fn output_name(&self, primary: &AttachmentRecord, hash: &str, stats: &mut RunStats) -> String {
        let original = primary.original_name();
        let original = Path::new(&original)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| hash.to_string());

        match self.corrector.corrected_extension(&primary.source_path, &original) {
            Some(extension) => {
                let stem = Path::new(&original)
                    .file_stem()
                    .map_or_else(|| hash.to_string(), |s| s.to_string_lossy().into_owned());
                let corrected = format!("{stem}{extension}");
                debug!(from = %original, to = %corrected, "Correcting extension");
                stats.extensions_corrected += 1;
                corrected
            }
            None => original,
        }
    }

    /// Phase 4: copy on the pool. Results line up with `tasks`.
    fn copy_files(&self, tasks: &[CopyTask]) -> Vec<io::Result<()>> {
        self.pool.install(|| {
            tasks
                .par_iter()
                .map(|task| copy_preserving_mtime(&task.source, &task.destination))
                .collect()
        })
    }
}

/// Fold copy results into the outcome. A group whose copy failed is
/// tracked as a failure and contributes nothing else.
fn fold_copies(
    groups: &[ContentGroup],
    tasks: &[CopyTask],
    results: Vec<io::Result<()>>,
    stats: &mut RunStats,
    failures: &mut FailureTracker,
) -> DedupOutcome {
    let mut outcome = DedupOutcome::default();
    for (task, result) in tasks.iter().zip(results) {
        let group = &groups[task.group];
        if let Err(e) = result {
            error!(
                source = %task.source.display(),
                destination = %task.destination.display(),
                error = %e,
                "Copy failed"
            );
            stats.copy_failures += 1;
            let mut context = BTreeMap::new();
            context.insert("destination".to_string(), task.destination.display().to_string());
            context.insert("source_export".to_string(), group.primary().record.source_export.clone());
            failures.add_processing_failure(&task.source, "copy failed", &e.to_string(), context);
            continue;
        }

        stats.files_copied += 1;
        stats.unique_files += 1;
        stats.duplicate_files += (group.len() - 1) as u64;
        outcome.content_hashes.insert(group.hash().to_string(), task.file_name.clone());

        assemble_group(group, &task.file_name, &mut outcome.conversations, stats);
    }

    stats.conversations = outcome.conversations.len() as u64;
    outcome
}

/// Copy `source` and carry its modification time over. A copy whose time
/// cannot be set still counts as copied.
fn copy_preserving_mtime(source: &Path, destination: &Path) -> io::Result<()> {
    fs::copy(source, destination)?;
    if let Err(e) = copy_mtime(source, destination) {
        warn!(path = %destination.display(), error = %e, "Could not keep modification time");
    }
    Ok(())
}

fn copy_mtime(source: &Path, destination: &Path) -> io::Result<()> {
    let modified = fs::metadata(source)?.modified()?;
    File::options().write(true).open(destination)?.set_modified(modified)
}

/// Phase 5: fold one copied group into the conversation map.
///
/// Members without a conversation id are left out and counted as
/// unassigned. Every remaining member's conversation is created if needed;
/// the entry itself goes to the first remaining member's conversation.
pub fn assemble_group(
    group: &ContentGroup,
    media_file: &str,
    conversations: &mut BTreeMap<String, Conversation>,
    stats: &mut RunStats,
) {
    let assigned: Vec<&AttachmentRecord> = group
        .members()
        .iter()
        .map(|m| &m.record)
        .filter(|r| !r.conversation_id.is_empty())
        .collect();
    stats.unassigned_records += (group.len() - assigned.len()) as u64;

    let Some(primary) = assigned.first() else {
        return;
    };

    for record in &assigned {
        conversations
            .entry(record.conversation_id.clone())
            .or_insert_with(|| Conversation::new(record.conversation_kind, record.conversation_title.clone()));
    }

    let entry = if assigned.len() == 1 {
        MessageEntry::Single(SingleEntry {
            occurrence: primary.occurrence(),
            media_file: media_file.to_string(),
            media_type: primary.media_kind(),
            is_live_photo_video: primary.is_live_photo_video(),
        })
    } else {
        MessageEntry::Merged(MergedEntry {
            media_file: media_file.to_string(),
            primary_created: primary.created.clone(),
            is_duplicate: true,
            media_type: primary.media_kind(),
            is_live_photo_video: primary.is_live_photo_video(),
            messages: assigned.iter().map(|r| r.occurrence()).collect(),
        })
    };

    if let Some(conversation) = conversations.get_mut(&primary.conversation_id) {
        conversation.push(entry);
    }
}
