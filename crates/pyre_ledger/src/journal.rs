//! # Ritual Journal
//!
//! **Crash-safe log of every committed state change.**
//!
//! Ledger-region mutations (balances, supply caps, cooldowns, the selector
//! nonce) and policy mutations (pause flags, interval, roles, configuration,
//! executor identity) are appended here before the call returns. On restart
//! the engine replays committed transactions on top of genesis:
//! - Committed transactions: replayed
//! - Uncommitted or torn transactions: dropped, and cut from the file
//!
//! ## Format
//!
//! ```text
//! [4 bytes: magic "PYRJ"]
//! [4 bytes: version]
//! [8 bytes: LSN at last checkpoint]
//!
//! Record:
//! [8 bytes: LSN]
//! [1 byte:  record type (BEGIN/OP/COMMIT/ROLLBACK)]
//! [4 bytes: payload length]
//! [N bytes: payload]
//! [4 bytes: CRC32 of the above]
//! ```
//!
//! All integers little-endian. Actor ids are written as their 20 raw bytes,
//! role names as a `u32` length followed by UTF-8.
//!
//! ## Failure handling
//!
//! An open transaction holds the file lock until it commits or rolls back.
//! If any write or the final sync fails, the file is truncated back to the
//! end of the last complete transaction. If even that fails, the journal
//! refuses every later write.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};
use pyre_shared::{ActorId, KindId, KindRole, PauseFlag, Rarity, Role, Tick};

use crate::error::{LedgerError, LedgerResult};
use crate::selector::RewardEntry;

/// Magic bytes identifying a journal file.
const JOURNAL_MAGIC: &[u8; 4] = b"PYRJ";

/// Current format version.
const JOURNAL_VERSION: u32 = 1;

/// Size of the file header.
const HEADER_LEN: u64 = 16;

/// Size of a record without its payload.
const RECORD_OVERHEAD: u64 = 8 + 1 + 4 + 4;

/// Journal record types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Opens a transaction.
    Begin = 1,
    /// One operation inside the open transaction.
    Operation = 2,
    /// Makes the open transaction durable.
    Commit = 3,
    /// Discards the open transaction.
    Rollback = 4,
}

impl RecordType {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Begin),
            2 => Some(Self::Operation),
            3 => Some(Self::Commit),
            4 => Some(Self::Rollback),
            _ => None,
        }
    }
}

/// A journaled state change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JournalOp {
    /// Units credited.
    Mint {
        /// Receiver.
        owner: ActorId,
        /// Kind.
        kind: KindId,
        /// Amount.
        amount: u64,
    },
    /// Units debited.
    Burn {
        /// Owner debited.
        owner: ActorId,
        /// Kind.
        kind: KindId,
        /// Amount.
        amount: u64,
    },
    /// Cooldown recorded for an actor.
    Cooldown {
        /// Actor.
        actor: ActorId,
        /// Tick of the ritual.
        tick: Tick,
    },
    /// Selector nonce reached `value`.
    Nonce {
        /// Next nonce to hand out.
        value: u64,
    },
    /// Supply cap replaced.
    SupplyCap {
        /// Kind.
        kind: KindId,
        /// New cap. Zero means unlimited.
        max: u64,
    },
    /// Pause flag set.
    Pause {
        /// Flag.
        flag: PauseFlag,
        /// New value.
        paused: bool,
    },
    /// Cooldown interval replaced.
    MinInterval {
        /// New interval.
        interval: Tick,
    },
    /// Role granted.
    RoleGranted {
        /// Admin who granted it.
        by: ActorId,
        /// Role.
        role: Role,
        /// Grantee.
        actor: ActorId,
    },
    /// Role revoked.
    RoleRevoked {
        /// Admin who revoked it.
        by: ActorId,
        /// Role.
        role: Role,
        /// Former holder.
        actor: ActorId,
    },
    /// Semantic role remapped.
    KindMapping {
        /// Role.
        role: KindRole,
        /// Kind it now resolves to.
        kind: KindId,
    },
    /// Conversion ratio replaced.
    ConversionRatio {
        /// New ratio.
        ratio: u64,
    },
    /// Tier output amount replaced.
    TierAmount {
        /// Tier.
        tier: Rarity,
        /// New amount.
        amount: u64,
    },
    /// Reward pool replaced.
    RewardPool {
        /// Entries in stored order.
        entries: Vec<RewardEntry>,
    },
    /// Processor identity replaced.
    Executor {
        /// New executor.
        executor: ActorId,
    },
}

const fn kind_role_code(role: KindRole) -> u8 {
    match role {
        KindRole::InputKey => 0,
        KindRole::ConversionSource => 1,
        KindRole::ConversionTarget => 2,
    }
}

const fn pause_flag_code(flag: PauseFlag) -> u8 {
    match flag {
        PauseFlag::Global => 0,
        PauseFlag::Sacrifices => 1,
        PauseFlag::Conversions => 2,
    }
}

fn pause_flag_from(code: u8) -> Option<PauseFlag> {
    match code {
        0 => Some(PauseFlag::Global),
        1 => Some(PauseFlag::Sacrifices),
        2 => Some(PauseFlag::Conversions),
        _ => None,
    }
}

fn rarity_from(code: u8) -> Option<Rarity> {
    (code <= Rarity::Mythic as u8).then(|| Rarity::from_u8(code))
}

fn put_role(buf: &mut Vec<u8>, role: &Role) {
    let name = role.as_str().as_bytes();
    let len = u32::try_from(name.len()).unwrap_or(u32::MAX);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(name);
}

/// Little-endian cursor over a payload.
struct OpReader<'a> {
    data: &'a [u8],
}

impl<'a> OpReader<'a> {
    const fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.data.len() < n {
            return None;
        }
        let (head, rest) = self.data.split_at(n);
        self.data = rest;
        Some(head)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1)?.first().copied()
    }

    fn u32(&mut self) -> Option<u32> {
        Some(u32::from_le_bytes(self.take(4)?.try_into().ok()?))
    }

    fn u64(&mut self) -> Option<u64> {
        Some(u64::from_le_bytes(self.take(8)?.try_into().ok()?))
    }

    fn bool(&mut self) -> Option<bool> {
        match self.u8()? {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        }
    }

    fn actor(&mut self) -> Option<ActorId> {
        let raw: [u8; 20] = self.take(20)?.try_into().ok()?;
        Some(ActorId::from(raw))
    }

    fn role(&mut self) -> Option<Role> {
        let len = usize::try_from(self.u32()?).ok()?;
        let name = std::str::from_utf8(self.take(len)?).ok()?;
        Some(Role::named(name))
    }

    const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl JournalOp {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        match self {
            Self::Mint { owner, kind, amount } | Self::Burn { owner, kind, amount } => {
                buf.push(if matches!(self, Self::Mint { .. }) { 1 } else { 2 });
                buf.extend_from_slice(owner.as_slice());
                buf.extend_from_slice(&kind.to_le_bytes());
                buf.extend_from_slice(&amount.to_le_bytes());
            }
            Self::Cooldown { actor, tick } => {
                buf.push(3);
                buf.extend_from_slice(actor.as_slice());
                buf.extend_from_slice(&tick.to_le_bytes());
            }
            Self::Nonce { value } => {
                buf.push(4);
                buf.extend_from_slice(&value.to_le_bytes());
            }
            Self::SupplyCap { kind, max } => {
                buf.push(5);
                buf.extend_from_slice(&kind.to_le_bytes());
                buf.extend_from_slice(&max.to_le_bytes());
            }
            Self::Pause { flag, paused } => {
                buf.push(6);
                buf.push(pause_flag_code(*flag));
                buf.push(u8::from(*paused));
            }
            Self::MinInterval { interval } => {
                buf.push(7);
                buf.extend_from_slice(&interval.to_le_bytes());
            }
            Self::RoleGranted { by, role, actor } | Self::RoleRevoked { by, role, actor } => {
                buf.push(if matches!(self, Self::RoleGranted { .. }) { 8 } else { 9 });
                buf.extend_from_slice(by.as_slice());
                buf.extend_from_slice(actor.as_slice());
                put_role(&mut buf, role);
            }
            Self::KindMapping { role, kind } => {
                buf.push(10);
                buf.push(kind_role_code(*role));
                buf.extend_from_slice(&kind.to_le_bytes());
            }
            Self::ConversionRatio { ratio } => {
                buf.push(11);
                buf.extend_from_slice(&ratio.to_le_bytes());
            }
            Self::TierAmount { tier, amount } => {
                buf.push(12);
                buf.push(*tier as u8);
                buf.extend_from_slice(&amount.to_le_bytes());
            }
            Self::RewardPool { entries } => {
                buf.push(13);
                let count = u32::try_from(entries.len()).unwrap_or(u32::MAX);
                buf.extend_from_slice(&count.to_le_bytes());
                for entry in entries {
                    buf.extend_from_slice(&entry.outcome.to_le_bytes());
                    buf.extend_from_slice(&entry.weight.to_le_bytes());
                    buf.push(entry.tier as u8);
                }
            }
            Self::Executor { executor } => {
                buf.push(14);
                buf.extend_from_slice(executor.as_slice());
            }
        }
        buf
    }

    fn decode(data: &[u8]) -> Option<Self> {
        let mut r = OpReader::new(data);
        let op = match r.u8()? {
            1 => Self::Mint {
                owner: r.actor()?,
                kind: r.u32()?,
                amount: r.u64()?,
            },
            2 => Self::Burn {
                owner: r.actor()?,
                kind: r.u32()?,
                amount: r.u64()?,
            },
            3 => Self::Cooldown {
                actor: r.actor()?,
                tick: r.u64()?,
            },
            4 => Self::Nonce { value: r.u64()? },
            5 => Self::SupplyCap {
                kind: r.u32()?,
                max: r.u64()?,
            },
            6 => Self::Pause {
                flag: pause_flag_from(r.u8()?)?,
                paused: r.bool()?,
            },
            7 => Self::MinInterval { interval: r.u64()? },
            tag @ (8 | 9) => {
                let by = r.actor()?;
                let actor = r.actor()?;
                let role = r.role()?;
                if tag == 8 {
                    Self::RoleGranted { by, role, actor }
                } else {
                    Self::RoleRevoked { by, role, actor }
                }
            }
            10 => Self::KindMapping {
                role: *KindRole::ALL.get(usize::from(r.u8()?))?,
                kind: r.u32()?,
            },
            11 => Self::ConversionRatio { ratio: r.u64()? },
            12 => Self::TierAmount {
                tier: rarity_from(r.u8()?)?,
                amount: r.u64()?,
            },
            13 => {
                let count = r.u32()?;
                let mut entries = Vec::new();
                for _ in 0..count {
                    let outcome = r.u32()?;
                    let weight = r.u32()?;
                    let tier = rarity_from(r.u8()?)?;
                    entries.push(RewardEntry::new(outcome, weight, tier));
                }
                Self::RewardPool { entries }
            }
            14 => Self::Executor {
                executor: r.actor()?,
            },
            _ => return None,
        };
        r.is_empty().then_some(op)
    }
}

/// A record as read back from disk.
#[derive(Clone, Debug)]
struct JournalRecord {
    lsn: u64,
    record_type: RecordType,
    payload: Vec<u8>,
}

fn io_err(context: &str) -> impl Fn(std::io::Error) -> LedgerError + '_ {
    move |e| LedgerError::Journal(format!("{context}: {e}"))
}

/// Writer side of the journal, guarded by the journal lock.
struct JournalFile {
    writer: BufWriter<File>,
    /// File length at the end of the last complete transaction.
    boundary_len: u64,
    /// Bytes handed to the writer so far, buffered or not.
    written_len: u64,
    /// Set when a failed transaction could not be cut from the file.
    poisoned: bool,
}

impl JournalFile {
    fn check_writable(&self) -> LedgerResult<()> {
        if self.poisoned {
            Err(LedgerError::Journal(
                "journal refuses writes after an unrecoverable write failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn write_record(&mut self, lsn: u64, record_type: RecordType, payload: &[u8]) -> LedgerResult<()> {
        self.check_writable()?;
        let len = u32::try_from(payload.len())
            .map_err(|_| LedgerError::Journal("payload too large".to_string()))?;

        let mut record = Vec::with_capacity(payload.len() + 17);
        record.extend_from_slice(&lsn.to_le_bytes());
        record.push(record_type as u8);
        record.extend_from_slice(&len.to_le_bytes());
        record.extend_from_slice(payload);
        let crc = crc32fast::hash(&record);
        record.extend_from_slice(&crc.to_le_bytes());

        self.writer.write_all(&record).map_err(io_err("journal write"))?;
        self.written_len += u64::from(len) + RECORD_OVERHEAD;
        Ok(())
    }

    /// Flushes and syncs, then marks the current end as a boundary.
    fn sync(&mut self) -> LedgerResult<()> {
        self.writer.flush().map_err(io_err("journal flush"))?;
        self.writer.get_ref().sync_data().map_err(io_err("journal sync"))?;
        self.boundary_len = self.written_len;
        Ok(())
    }

    /// Cuts everything after the last boundary, buffered bytes included.
    fn discard_pending(&mut self) {
        if self.poisoned {
            return;
        }
        match self.truncate_to_boundary() {
            Ok(()) => self.written_len = self.boundary_len,
            Err(e) => {
                self.poisoned = true;
                tracing::error!(error = %e, "journal tail could not be discarded; refusing further writes");
            }
        }
    }

    fn truncate_to_boundary(&mut self) -> std::io::Result<()> {
        let file = self.writer.get_ref().try_clone()?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        // Buffered bytes are dropped unwritten.
        drop(stale.into_parts());
        self.writer.get_ref().set_len(self.boundary_len)?;
        self.writer.get_ref().sync_data()
    }
}

/// Handle for one open transaction.
///
/// Holds the journal lock until it is finished. Dropping it without
/// `commit` cuts its records from the file.
pub struct JournalTxn<'a> {
    journal: &'a RitualJournal,
    file: MutexGuard<'a, JournalFile>,
    /// LSN of the BEGIN record.
    pub txn_id: u64,
    finalized: bool,
}

impl JournalTxn<'_> {
    fn write(&mut self, record_type: RecordType, payload: &[u8]) -> LedgerResult<u64> {
        let lsn = self.journal.next_lsn.fetch_add(1, Ordering::SeqCst);
        self.file.write_record(lsn, record_type, payload)?;
        Ok(lsn)
    }

    /// Appends one operation.
    ///
    /// # Errors
    ///
    /// `Journal` on I/O failure.
    pub fn add(&mut self, op: &JournalOp) -> LedgerResult<()> {
        self.write(RecordType::Operation, &op.encode())?;
        Ok(())
    }

    /// Writes COMMIT and syncs. Durable once this returns.
    ///
    /// # Errors
    ///
    /// `Journal` on I/O failure. Nothing of the transaction is left in
    /// the file.
    pub fn commit(mut self) -> LedgerResult<()> {
        let result = self
            .write(RecordType::Commit, &[])
            .and_then(|_| self.file.sync());
        if result.is_err() {
            self.abort();
        }
        self.finalized = true;
        result
    }

    /// Writes ROLLBACK and closes the transaction.
    ///
    /// # Errors
    ///
    /// `Journal` if the journal has stopped accepting writes.
    pub fn rollback(mut self) -> LedgerResult<()> {
        let marked = self.write(RecordType::Rollback, &[]).and_then(|_| {
            self.file.writer.flush().map_err(io_err("journal flush"))?;
            self.file.boundary_len = self.file.written_len;
            Ok(())
        });
        if marked.is_err() {
            self.abort();
        }
        self.finalized = true;
        self.file.check_writable()
    }

    fn abort(&mut self) {
        self.finalized = true;
        self.file.discard_pending();
    }
}

impl Drop for JournalTxn<'_> {
    fn drop(&mut self) {
        if !self.finalized {
            self.abort();
        }
    }
}

/// What a scan of the file found.
struct Scan {
    committed: Vec<JournalOp>,
    next_lsn: u64,
    /// Offset just past the last COMMIT or ROLLBACK record.
    boundary_len: u64,
}

/// Append-only journal file.
pub struct RitualJournal {
    path: PathBuf,
    next_lsn: AtomicU64,
    file: Mutex<JournalFile>,
}

impl std::fmt::Debug for RitualJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RitualJournal")
            .field("path", &self.path)
            .field("next_lsn", &self.next_lsn.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl RitualJournal {
    /// Opens or creates a journal file.
    ///
    /// Anything after the last complete transaction (a torn record, a
    /// corrupt record, an unfinished transaction) is cut off, so new
    /// records always follow valid ones.
    ///
    /// # Errors
    ///
    /// `Journal` if the file cannot be opened or has a foreign header.
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(io_err("open journal"))?;
        let len = file.metadata().map_err(io_err("journal metadata"))?.len();
        let mut writer = BufWriter::new(file);

        if len < HEADER_LEN {
            // New file, or a header torn while the file was being created.
            writer.get_ref().set_len(0).map_err(io_err("truncate journal"))?;
            Self::write_header(&mut writer, 0)?;
        }

        let scan = Self::scan(&path)?;
        let on_disk = writer.get_ref().metadata().map_err(io_err("journal metadata"))?.len();
        if scan.boundary_len < on_disk {
            tracing::warn!(
                discarded_bytes = on_disk - scan.boundary_len,
                path = %path.display(),
                "cutting journal tail after the last complete transaction"
            );
            writer.get_ref().set_len(scan.boundary_len).map_err(io_err("truncate journal"))?;
            writer.get_ref().sync_data().map_err(io_err("journal sync"))?;
        }

        Ok(Self {
            path,
            next_lsn: AtomicU64::new(scan.next_lsn),
            file: Mutex::new(JournalFile {
                writer,
                boundary_len: scan.boundary_len,
                written_len: scan.boundary_len,
                poisoned: false,
            }),
        })
    }

    /// Path of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_header(writer: &mut BufWriter<File>, lsn: u64) -> LedgerResult<()> {
        writer.write_all(JOURNAL_MAGIC).map_err(io_err("write header"))?;
        writer.write_all(&JOURNAL_VERSION.to_le_bytes()).map_err(io_err("write header"))?;
        writer.write_all(&lsn.to_le_bytes()).map_err(io_err("write header"))?;
        writer.flush().map_err(io_err("flush header"))?;
        writer.get_ref().sync_data().map_err(io_err("journal sync"))
    }

    /// Opens a transaction. Blocks until any other transaction finishes.
    ///
    /// # Errors
    ///
    /// `Journal` on I/O failure, or if the journal has stopped accepting
    /// writes.
    pub fn begin(&self) -> LedgerResult<JournalTxn<'_>> {
        let mut txn = JournalTxn {
            journal: self,
            file: self.file.lock(),
            txn_id: 0,
            finalized: false,
        };
        txn.txn_id = txn.write(RecordType::Begin, &[])?;
        Ok(txn)
    }

    /// Writes `ops` as one committed transaction.
    ///
    /// # Errors
    ///
    /// `Journal` on I/O failure. The partial transaction is cut from the
    /// file.
    pub fn append(&self, ops: &[JournalOp]) -> LedgerResult<u64> {
        let mut txn = self.begin()?;
        for op in ops {
            txn.add(op)?;
        }
        let txn_id = txn.txn_id;
        txn.commit()?;
        Ok(txn_id)
    }

    /// Reads back every committed operation, in commit order.
    ///
    /// Must not be called while this thread holds an open transaction.
    ///
    /// # Errors
    ///
    /// `Journal` if the file cannot be read or has a foreign header.
    pub fn recover(&self) -> LedgerResult<Vec<JournalOp>> {
        self.file.lock().writer.flush().map_err(io_err("journal flush"))?;
        Ok(Self::scan(&self.path)?.committed)
    }

    /// Walks the file from the header to the first torn or corrupt record.
    fn scan(path: &Path) -> LedgerResult<Scan> {
        let file = File::open(path).map_err(io_err("open journal for recovery"))?;
        let mut reader = BufReader::new(file);

        let mut header = [0u8; 16];
        reader.read_exact(&mut header).map_err(io_err("read journal header"))?;
        let mut head = OpReader::new(&header);
        if head.take(4) != Some(JOURNAL_MAGIC.as_slice()) {
            return Err(LedgerError::Journal("not a ritual journal".to_string()));
        }
        let version = head.u32().unwrap_or_default();
        if version != JOURNAL_VERSION {
            return Err(LedgerError::Journal(format!("unsupported journal version {version}")));
        }
        let mut next_lsn = head.u64().unwrap_or_default();

        let mut committed = Vec::new();
        let mut open: Option<Vec<JournalOp>> = None;
        let mut dropped = 0usize;
        let mut offset = HEADER_LEN;
        let mut boundary_len = HEADER_LEN;

        while let Some((record, size)) = Self::read_record(&mut reader) {
            offset += size;
            next_lsn = next_lsn.max(record.lsn.saturating_add(1));
            match record.record_type {
                RecordType::Begin => {
                    if open.replace(Vec::new()).is_some() {
                        dropped += 1;
                    }
                }
                RecordType::Operation => {
                    let op = JournalOp::decode(&record.payload);
                    match (open.as_mut(), op) {
                        (Some(ops), Some(op)) => ops.push(op),
                        // Undecodable op poisons its transaction.
                        (Some(_), None) => {
                            open = None;
                            dropped += 1;
                        }
                        (None, _) => {}
                    }
                }
                RecordType::Commit => {
                    if let Some(ops) = open.take() {
                        committed.extend(ops);
                    }
                    boundary_len = offset;
                }
                RecordType::Rollback => {
                    open = None;
                    boundary_len = offset;
                }
            }
        }

        if open.is_some() {
            dropped += 1;
        }
        if dropped > 0 {
            tracing::warn!(dropped, path = %path.display(), "journal recovery discarded uncommitted transactions");
        }
        Ok(Scan {
            committed,
            next_lsn,
            boundary_len,
        })
    }

    /// Reads one record and its size on disk. `None` at end of file or on
    /// a torn or corrupt record.
    fn read_record(reader: &mut BufReader<File>) -> Option<(JournalRecord, u64)> {
        let mut head = [0u8; 13];
        reader.read_exact(&mut head).ok()?;
        let mut fields = OpReader::new(&head);
        let lsn = fields.u64()?;
        let record_type = RecordType::from_u8(fields.u8()?)?;
        let len = fields.u32()?;

        let mut payload = vec![0u8; usize::try_from(len).ok()?];
        reader.read_exact(&mut payload).ok()?;
        let mut crc_bytes = [0u8; 4];
        reader.read_exact(&mut crc_bytes).ok()?;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&head);
        hasher.update(&payload);
        if hasher.finalize() != u32::from_le_bytes(crc_bytes) {
            return None;
        }

        let record = JournalRecord {
            lsn,
            record_type,
            payload,
        };
        Some((record, u64::from(len) + RECORD_OVERHEAD))
    }

    /// Discards every record, keeping the LSN sequence.
    ///
    /// Call after both regions have been persisted elsewhere.
    ///
    /// # Errors
    ///
    /// `Journal` on I/O failure.
    pub fn checkpoint(&self) -> LedgerResult<()> {
        let mut file = self.file.lock();
        file.check_writable()?;
        file.writer.flush().map_err(io_err("journal flush"))?;
        file.writer.get_ref().set_len(0).map_err(io_err("truncate journal"))?;
        Self::write_header(&mut file.writer, self.next_lsn.load(Ordering::SeqCst))?;
        file.boundary_len = HEADER_LEN;
        file.written_len = HEADER_LEN;
        Ok(())
    }
}
