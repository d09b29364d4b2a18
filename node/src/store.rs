//! # CrowdStore: Persistent Storage
//!
//! Everything the node knows survives restarts through this module, built on
//! sled's embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree        | Key                    | Value                      |
//! |-------------|------------------------|----------------------------|
//! | `campaigns` | `campaign_id` (16B)    | `bincode(Campaign)`        |
//! | `registry`  | `order` (UTF-8)        | `bincode(Vec<CampaignId>)` |
//! | `events`    | `sequence` (8B BE)     | `bincode(EventRecord)`     |
//! | `accounts`  | `address` (20B)        | `bincode(AccountState)`    |
//! | `metadata`  | key (UTF-8)            | value (bytes)              |
//!
//! Event sequence numbers are stored big-endian so that sled's lexicographic
//! ordering matches the journal order.
//!
//! ## Atomic Commits
//!
//! Writes are collected in a [`Changeset`] and applied by
//! [`CrowdStore::commit`] as one transaction spanning every tree. After a
//! crash the store holds either all of a call's writes or none of them.

use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::path::Path;

use crowdx_contracts::{Campaign, CampaignId, CampaignRegistry, EventRecord, RestoreError};
use crowdx_protocol::{AccountState, Address, Amount, Ledger, LedgerError};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt entry in `{tree}`: {reason}")]
    Corrupt { tree: &'static str, reason: String },

    #[error("persisted registry is inconsistent: {0}")]
    Registry(#[from] RestoreError),

    #[error("persisted ledger is inconsistent: {0}")]
    Ledger(#[from] LedgerError),
}

pub type StoreResult<T> = Result<T, StoreError>;

fn encode<T: serde::Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn fixed<const N: usize>(tree: &'static str, bytes: &[u8]) -> StoreResult<[u8; N]> {
    bytes.try_into().map_err(|_| StoreError::Corrupt {
        tree,
        reason: format!("expected {} bytes, found {}", N, bytes.len()),
    })
}

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

const KEY_ORDER: &[u8] = b"order";
const META_CUSTODY: &[u8] = b"custody";
const META_TOTAL_SUPPLY: &[u8] = b"total_supply";
const META_CLOCK_OFFSET: &[u8] = b"clock_offset";
const META_PROTOCOL_VERSION: &[u8] = b"protocol_version";

// ---------------------------------------------------------------------------
// Changeset
// ---------------------------------------------------------------------------

/// Encoded writes for one host call, applied together by
/// [`CrowdStore::commit`].
#[derive(Debug, Default)]
pub struct Changeset {
    campaigns: Vec<([u8; 16], Vec<u8>)>,
    order: Option<Vec<u8>>,
    events: Vec<(u64, Vec<u8>)>,
    accounts: Vec<(Address, Vec<u8>)>,
    metadata: Vec<(&'static [u8], Vec<u8>)>,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write one campaign.
    pub fn put_campaign(&mut self, id: &CampaignId, campaign: &Campaign) -> StoreResult<()> {
        self.campaigns
            .push((*id.as_uuid().as_bytes(), encode(campaign)?));
        Ok(())
    }

    /// Write the creation-ordered handle sequence.
    pub fn put_order(&mut self, order: &[CampaignId]) -> StoreResult<()> {
        self.order = Some(encode(&order)?);
        Ok(())
    }

    /// Append journal entries. The commit is refused if an entry's sequence
    /// number is already on disk or does not follow the last one stored.
    pub fn append_events(&mut self, records: &[EventRecord]) -> StoreResult<()> {
        for record in records {
            self.events.push((record.sequence, encode(record)?));
        }
        Ok(())
    }

    /// Write every account, the custody balance and the total supply.
    pub fn put_ledger(&mut self, ledger: &Ledger) -> StoreResult<()> {
        for (address, state) in ledger.accounts() {
            self.accounts.push((*address, encode(state)?));
        }
        self.metadata
            .push((META_CUSTODY, ledger.custody_balance().to_be_bytes().to_vec()));
        self.metadata
            .push((META_TOTAL_SUPPLY, ledger.total_supply().to_be_bytes().to_vec()));
        Ok(())
    }

    /// Write the devnet clock offset.
    pub fn put_clock_offset(&mut self, secs: i64) {
        self.metadata
            .push((META_CLOCK_OFFSET, secs.to_be_bytes().to_vec()));
    }
}

// ---------------------------------------------------------------------------
// CrowdStore
// ---------------------------------------------------------------------------

/// Persistent storage for campaigns, the notification journal and the
/// account ledger.
///
/// sled trees are safe to share across threads; the node still serializes
/// writers through the host mutex so a snapshot is never interleaved.
#[derive(Debug, Clone)]
pub struct CrowdStore {
    db: Db,
    campaigns: Tree,
    registry: Tree,
    events: Tree,
    accounts: Tree,
    metadata: Tree,
}

impl CrowdStore {
    /// Open or create a store at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A store that lives in memory and disappears when dropped.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        Ok(Self {
            campaigns: db.open_tree("campaigns")?,
            registry: db.open_tree("registry")?,
            events: db.open_tree("events")?,
            accounts: db.open_tree("accounts")?,
            metadata: db.open_tree("metadata")?,
            db,
        })
    }

    // -- Initialization -----------------------------------------------------

    /// Stamps the store with the protocol version it was created under.
    pub fn initialize(&self) -> StoreResult<()> {
        self.metadata.insert(
            META_PROTOCOL_VERSION,
            crowdx_protocol::config::PROTOCOL_VERSION.as_bytes(),
        )?;
        self.flush()
    }

    /// Protocol version recorded by [`initialize`](Self::initialize), if any.
    pub fn protocol_version(&self) -> StoreResult<Option<String>> {
        Ok(self
            .metadata
            .get(META_PROTOCOL_VERSION)?
            .map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    // -- Writes ---------------------------------------------------------------

    /// Apply `changes` as a single transaction across all trees.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if the journal entries would collide
    /// with or skip past what is already stored. Nothing is written then.
    pub fn commit(&self, changes: &Changeset) -> StoreResult<()> {
        let trees = (
            &self.campaigns,
            &self.registry,
            &self.events,
            &self.accounts,
            &self.metadata,
        );
        let result = trees.transaction(|(campaigns, registry, events, accounts, metadata)| {
            for (id, value) in &changes.campaigns {
                campaigns.insert(&id[..], value.as_slice())?;
            }
            if let Some(order) = &changes.order {
                registry.insert(KEY_ORDER, order.as_slice())?;
            }
            for (sequence, value) in &changes.events {
                let key = sequence.to_be_bytes();
                if events.get(key)?.is_some() {
                    return Err(ConflictableTransactionError::Abort(StoreError::Corrupt {
                        tree: "events",
                        reason: format!("sequence {sequence} is already stored"),
                    }));
                }
                if let Some(previous) = sequence.checked_sub(1) {
                    if events.get(previous.to_be_bytes())?.is_none() {
                        return Err(ConflictableTransactionError::Abort(StoreError::Corrupt {
                            tree: "events",
                            reason: format!("sequence {previous} is missing"),
                        }));
                    }
                }
                events.insert(&key[..], value.as_slice())?;
            }
            for (address, value) in &changes.accounts {
                accounts.insert(address.as_bytes().as_slice(), value.as_slice())?;
            }
            for (key, value) in &changes.metadata {
                metadata.insert(*key, value.as_slice())?;
            }
            Ok(())
        });

        result.map_err(|err| match err {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => StoreError::Sled(err),
        })
    }

    // -- Registry -----------------------------------------------------------

    /// Rebuild the registry from disk. An empty store yields an empty
    /// registry.
    pub fn load_registry(&self) -> StoreResult<CampaignRegistry> {
        let order: Vec<CampaignId> = match self.registry.get(KEY_ORDER)? {
            Some(bytes) => decode(&bytes)?,
            None => Vec::new(),
        };

        let mut campaigns = Vec::with_capacity(order.len());
        for entry in self.campaigns.iter() {
            let (key, value) = entry?;
            let id = CampaignId::from(uuid::Uuid::from_bytes(fixed::<16>("campaigns", &key)?));
            campaigns.push((id, decode::<Campaign>(&value)?));
        }

        let mut journal = Vec::with_capacity(self.events.len());
        for entry in self.events.iter() {
            let (_, value) = entry?;
            journal.push(decode::<EventRecord>(&value)?);
        }

        Ok(CampaignRegistry::restore(order, campaigns, journal)?)
    }

    // -- Ledger -------------------------------------------------------------

    /// Rebuild the ledger from disk.
    pub fn load_ledger(&self) -> StoreResult<Ledger> {
        let custody: Amount = self.meta_u64(META_CUSTODY)?.unwrap_or(0);
        let total_supply = self.meta_u64(META_TOTAL_SUPPLY)?;

        let mut accounts = Vec::with_capacity(self.accounts.len());
        for entry in self.accounts.iter() {
            let (key, value) = entry?;
            let address = Address::from_bytes(fixed("accounts", &key)?);
            accounts.push((address, decode::<AccountState>(&value)?));
        }

        Ok(Ledger::restore(accounts, custody, total_supply)?)
    }

    // -- Clock ----------------------------------------------------------------

    /// The persisted clock offset; zero if never set.
    pub fn clock_offset(&self) -> StoreResult<i64> {
        match self.metadata.get(META_CLOCK_OFFSET)? {
            Some(bytes) => Ok(i64::from_be_bytes(fixed::<8>("metadata", &bytes)?)),
            None => Ok(0),
        }
    }

    fn meta_u64(&self, key: &[u8]) -> StoreResult<Option<u64>> {
        match self.metadata.get(key)? {
            Some(bytes) => Ok(Some(u64::from_be_bytes(fixed::<8>("metadata", &bytes)?))),
            None => Ok(None),
        }
    }

    // -- Utility --------------------------------------------------------------

    /// Number of campaigns on disk.
    pub fn campaign_count(&self) -> usize {
        self.campaigns.len()
    }

    /// Number of journal entries on disk.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Block until all pending writes are durable.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
