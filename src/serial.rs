use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::block::Block;
use crate::node::{Node, NodeInfo};
use crate::{Trie, TrieError, Value};

/// Bytes per node record in the primary image.
const NODE_RECORD: u64 = 8;
/// Bytes per block record in the sidecar.
const BLOCK_RECORD: usize = 20;

fn sidecar_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".sbl");
    PathBuf::from(os)
}

impl<V: Value> Trie<V> {
    /// Writes the primary image: `size` records of `(base, check)` pairs in
    /// little-endian order, nothing else.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), TrieError> {
        debug!(path = %path.as_ref().display(), slots = self.size, "saving image");
        let mut w = BufWriter::new(File::create(path)?);
        for n in &self.nodes[..self.size] {
            w.write_all(&n.base.to_le_bytes())?;
            w.write_all(&n.check.to_le_bytes())?;
        }
        w.flush()?;
        Ok(())
    }

    /// Writes the primary image plus a `<path>.sbl` sidecar carrying the
    /// three class-list heads, the info array, and the block array, so that
    /// [`open_with_sidecar`](Trie::open_with_sidecar) can skip
    /// [`restore`](Trie::restore).
    pub fn save_with_sidecar<P: AsRef<Path>>(&self, path: P) -> Result<(), TrieError> {
        assert!(
            self.infos.len() >= self.size && self.blocks.len() >= self.size >> 8,
            "sidecar save requires restored state"
        );
        self.save(&path)?;
        let mut w = BufWriter::new(File::create(sidecar_path(path.as_ref()))?);
        w.write_all(&self.head_full.to_le_bytes())?;
        w.write_all(&self.head_closed.to_le_bytes())?;
        w.write_all(&self.head_open.to_le_bytes())?;
        for info in &self.infos[..self.size] {
            w.write_all(&[info.child, info.sibling])?;
        }
        for b in &self.blocks[..self.size >> 8] {
            w.write_all(&b.prev.to_le_bytes())?;
            w.write_all(&b.next.to_le_bytes())?;
            w.write_all(&b.num.to_le_bytes())?;
            w.write_all(&b.reject.to_le_bytes())?;
            w.write_all(&b.trial.to_le_bytes())?;
            w.write_all(&b.ehead.to_le_bytes())?;
        }
        w.flush()?;
        Ok(())
    }

    /// Loads a primary image. `offset` and `len` select a byte window inside
    /// a larger file; `len = None` reads from `offset` to the end.
    ///
    /// Only the node array is read. Queries work immediately; the first
    /// mutation or prediction rebuilds the info and block arrays, or call
    /// [`restore`](Trie::restore) to pay that cost up front.
    pub fn open<P: AsRef<Path>>(path: P, offset: u64, len: Option<u64>) -> Result<Self, TrieError> {
        let mut f = File::open(&path)?;
        let total = f.metadata()?.len();
        if offset > total {
            return Err(TrieError::Truncated);
        }
        let len = len.unwrap_or(total - offset);
        if offset + len > total {
            return Err(TrieError::Truncated);
        }
        if len == 0 || len % (256 * NODE_RECORD) != 0 {
            return Err(TrieError::InvalidImage(len));
        }
        debug!(path = %path.as_ref().display(), offset, len, "opening image");

        f.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        f.read_exact(&mut buf)?;

        let size = (len / NODE_RECORD) as usize;
        let mut nodes = Vec::with_capacity(size);
        for rec in buf.chunks_exact(NODE_RECORD as usize) {
            nodes.push(Node::new(
                i32::from_le_bytes(rec[0..4].try_into().unwrap()),
                i32::from_le_bytes(rec[4..8].try_into().unwrap()),
            ));
        }

        let mut reject = [0i16; 257];
        for (num, r) in reject.iter_mut().enumerate() {
            *r = num as i16 + 1;
        }
        Ok(Self {
            nodes,
            infos: Vec::new(),
            blocks: Vec::new(),
            reject,
            head_full: 0,
            head_closed: 0,
            head_open: 0,
            size,
            max_alloc: 0,
            tracked: Vec::new(),
            _value: PhantomData,
        })
    }

    /// Loads a primary image together with its `<path>.sbl` sidecar,
    /// skipping reconstruction entirely.
    pub fn open_with_sidecar<P: AsRef<Path>>(path: P) -> Result<Self, TrieError> {
        let mut trie = Self::open(&path, 0, None)?;
        let mut r = BufReader::new(File::open(sidecar_path(path.as_ref()))?);

        let mut word = [0u8; 4];
        r.read_exact(&mut word)?;
        trie.head_full = i32::from_le_bytes(word);
        r.read_exact(&mut word)?;
        trie.head_closed = i32::from_le_bytes(word);
        r.read_exact(&mut word)?;
        trie.head_open = i32::from_le_bytes(word);

        let mut infos = vec![0u8; trie.size * 2];
        r.read_exact(&mut infos).map_err(|_| TrieError::Truncated)?;
        trie.infos = infos
            .chunks_exact(2)
            .map(|c| NodeInfo {
                child: c[0],
                sibling: c[1],
            })
            .collect();

        let mut blocks = vec![0u8; (trie.size >> 8) * BLOCK_RECORD];
        r.read_exact(&mut blocks).map_err(|_| TrieError::Truncated)?;
        trie.blocks = blocks
            .chunks_exact(BLOCK_RECORD)
            .map(|c| Block {
                prev: i32::from_le_bytes(c[0..4].try_into().unwrap()),
                next: i32::from_le_bytes(c[4..8].try_into().unwrap()),
                num: i16::from_le_bytes(c[8..10].try_into().unwrap()),
                reject: i16::from_le_bytes(c[10..12].try_into().unwrap()),
                trial: i32::from_le_bytes(c[12..16].try_into().unwrap()),
                ehead: i32::from_le_bytes(c[16..20].try_into().unwrap()),
            })
            .collect();
        Ok(trie)
    }

    /// Rebuilds the info and block arrays from the node array alone. A no-op
    /// when they are already present.
    pub fn restore(&mut self) {
        if self.blocks.is_empty() {
            self.restore_blocks();
        }
        if self.infos.is_empty() {
            self.restore_info();
        }
    }

    #[inline]
    pub(crate) fn ensure_restored(&mut self) {
        if self.infos.is_empty() || self.blocks.is_empty() {
            self.restore();
        }
    }

    /// Re-derives every sibling chain: each live non-root slot contributes
    /// its label to its parent's chain. Label-0 children need no entry; a
    /// zero child field already denotes them.
    fn restore_info(&mut self) {
        self.infos = vec![NodeInfo::default(); self.size];
        for to in 256..self.size {
            let from = self.nodes[to].check;
            if from < 0 {
                continue; // empty slot
            }
            let base = self.nodes[from as usize].base;
            let label = (base ^ to as i32) as u8;
            if label != 0 {
                let has_child = self.infos[from as usize].child != 0
                    || self.nodes[base as usize].check == from;
                self.push_sibling(from as usize, base, label, has_child);
            }
        }
    }

    /// Re-derives the block metadata: recounts empties per 256-slot window,
    /// picks a ring entry point, and classifies each block (block 0 stays
    /// outside the class lists).
    fn restore_blocks(&mut self) {
        use crate::block::BlockClass;

        self.blocks = vec![Block::default(); self.size >> 8];
        self.head_full = 0;
        self.head_closed = 0;
        self.head_open = 0;
        for bi in 0..(self.size >> 8) {
            let lo = bi << 8;
            let mut num = 0i16;
            let mut ehead = 0i32;
            for e in lo..lo + 256 {
                if e != 0 && self.nodes[e].check < 0 {
                    num += 1;
                    if num == 1 {
                        ehead = e as i32;
                    }
                }
            }
            self.blocks[bi].num = num;
            self.blocks[bi].ehead = ehead;
            if bi == 0 {
                continue;
            }
            let class = match num {
                0 => BlockClass::Full,
                1 => BlockClass::Closed,
                _ => BlockClass::Open,
            };
            self.push_block(bi as i32, class);
        }
    }
}
