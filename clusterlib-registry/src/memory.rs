//! An in-process [`Registry`] implementation used by this crate's own
//! test suite (and exported for downstream crates' tests) so none of
//! them need a live coordination service to exercise the adapter,
//! cache or sync primitives. Not a production backend.
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::Mutex;

use crate::registry_trait::{
    CreateFlags, Registry, RegistryError, RegistryErrorKind, RegistryEvent, RegistryEventKind,
    RegistryResult, SessionState, Stat,
};

struct MemNode {
    data: Vec<u8>,
    version: i32,
    ephemeral: bool,
    children: HashSet<String>,
    seq_counter: u64,
}

struct Inner {
    nodes: HashMap<String, MemNode>,
    data_watches: HashSet<String>,
    exists_watches: HashSet<String>,
    child_watches: HashSet<String>,
}

/// A single-process tree that mimics the coordination store closely
/// enough to drive the adapter's retry/watch logic in tests: paths,
/// versions, ephemeral/sequential semantics and one-shot watches all
/// behave per §6.1/§6.2.
pub struct MemoryRegistry {
    inner: Mutex<Inner>,
    sender: Sender<RegistryEvent>,
    receiver: Mutex<Option<Receiver<RegistryEvent>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        let (sender, receiver) = channel();
        let mut nodes = HashMap::new();
        nodes.insert(
            "/".to_string(),
            MemNode {
                data: Vec::new(),
                version: 0,
                ephemeral: false,
                children: HashSet::new(),
                seq_counter: 0,
            },
        );
        MemoryRegistry {
            inner: Mutex::new(Inner {
                nodes,
                data_watches: HashSet::new(),
                exists_watches: HashSet::new(),
                child_watches: HashSet::new(),
            }),
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    fn parent_of(path: &str) -> RegistryResult<String> {
        if path == "/" {
            return Err(RegistryError::new("root has no parent", RegistryErrorKind::Other));
        }
        match path.rfind('/') {
            Some(0) => Ok("/".to_string()),
            Some(idx) => Ok(path[..idx].to_string()),
            None => Err(RegistryError::new("malformed path", RegistryErrorKind::Other)),
        }
    }

    fn fire(&self, kind: RegistryEventKind, path: &str) {
        let _ = self.sender.send(RegistryEvent {
            kind,
            session_state: SessionState::Unchanged,
            path: path.to_string(),
        });
    }

    /// Test hook: simulate session expiry by dropping every ephemeral
    /// node and broadcasting a session event.
    pub fn expire_session(&self) {
        let mut guard = self.inner.lock().unwrap();
        let ephemeral_paths: Vec<String> = guard
            .nodes
            .iter()
            .filter(|(_, n)| n.ephemeral)
            .map(|(p, _)| p.clone())
            .collect();
        for path in &ephemeral_paths {
            guard.nodes.remove(path);
            if let Ok(parent) = Self::parent_of(path) {
                if let Some(p) = guard.nodes.get_mut(&parent) {
                    p.children.remove(path.rsplit('/').next().unwrap_or(""));
                }
            }
        }
        drop(guard);
        let _ = self.sender.send(RegistryEvent {
            kind: RegistryEventKind::Session,
            session_state: SessionState::Expired,
            path: String::new(),
        });
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry for MemoryRegistry {
    fn create(&self, path: &str, data: &[u8], flags: CreateFlags) -> RegistryResult<String> {
        let mut guard = self.inner.lock().unwrap();

        let final_path = if flags.sequential {
            let parent = Self::parent_of(path)?;
            let seq = {
                let parent_node = guard
                    .nodes
                    .get_mut(&parent)
                    .ok_or_else(|| RegistryError::new(parent.clone(), RegistryErrorKind::NoParent))?;
                let seq = parent_node.seq_counter;
                parent_node.seq_counter += 1;
                seq
            };
            format!("{path}{seq:010}")
        } else {
            path.to_string()
        };

        if guard.nodes.contains_key(&final_path) {
            return Err(RegistryError::new(final_path, RegistryErrorKind::NodeExists));
        }

        let parent = Self::parent_of(&final_path)?;
        let child_name = final_path.rsplit('/').next().unwrap_or("").to_string();
        {
            let parent_node = guard
                .nodes
                .get_mut(&parent)
                .ok_or_else(|| RegistryError::new(parent.clone(), RegistryErrorKind::NoParent))?;
            parent_node.children.insert(child_name);
        }

        guard.nodes.insert(
            final_path.clone(),
            MemNode {
                data: data.to_vec(),
                version: 0,
                ephemeral: flags.ephemeral,
                children: HashSet::new(),
                seq_counter: 0,
            },
        );

        let child_watch_armed = guard.child_watches.remove(&parent);
        let exists_watch_armed = guard.exists_watches.remove(&final_path);
        drop(guard);

        if child_watch_armed {
            self.fire(RegistryEventKind::Child, &parent);
        }
        if exists_watch_armed {
            self.fire(RegistryEventKind::Created, &final_path);
        }
        Ok(final_path)
    }

    fn delete(&self, path: &str, version: i32) -> RegistryResult<()> {
        let mut guard = self.inner.lock().unwrap();
        let node = guard
            .nodes
            .get(path)
            .ok_or_else(|| RegistryError::new(path.to_string(), RegistryErrorKind::NoNode))?;
        if version >= 0 && node.version != version {
            return Err(RegistryError::new(path.to_string(), RegistryErrorKind::BadVersion));
        }
        if !node.children.is_empty() {
            return Err(RegistryError::new(
                format!("{path} has children"),
                RegistryErrorKind::Other,
            ));
        }
        guard.nodes.remove(path);

        let parent = Self::parent_of(path)?;
        let child_name = path.rsplit('/').next().unwrap_or("").to_string();
        if let Some(p) = guard.nodes.get_mut(&parent) {
            p.children.remove(&child_name);
        }

        let data_watch_armed = guard.data_watches.remove(path);
        let exists_watch_armed = guard.exists_watches.remove(path);
        let child_watch_armed = guard.child_watches.remove(&parent);
        drop(guard);

        if data_watch_armed || exists_watch_armed {
            self.fire(RegistryEventKind::Deleted, path);
        }
        if child_watch_armed {
            self.fire(RegistryEventKind::Child, &parent);
        }
        Ok(())
    }

    fn exists(&self, path: &str, watch: bool) -> RegistryResult<Option<Stat>> {
        let mut guard = self.inner.lock().unwrap();
        let found = guard.nodes.get(path).map(|n| Stat {
            version: n.version,
            ephemeral: n.ephemeral,
        });
        if watch {
            guard.exists_watches.insert(path.to_string());
        }
        Ok(found)
    }

    fn get_data(&self, path: &str, watch: bool) -> RegistryResult<(Vec<u8>, Stat)> {
        let mut guard = self.inner.lock().unwrap();
        let node = guard
            .nodes
            .get(path)
            .ok_or_else(|| RegistryError::new(path.to_string(), RegistryErrorKind::NoNode))?;
        let result = (
            node.data.clone(),
            Stat {
                version: node.version,
                ephemeral: node.ephemeral,
            },
        );
        if watch {
            guard.data_watches.insert(path.to_string());
        }
        Ok(result)
    }

    fn set_data(&self, path: &str, data: &[u8], version: i32) -> RegistryResult<Stat> {
        let mut guard = self.inner.lock().unwrap();
        let node = guard
            .nodes
            .get_mut(path)
            .ok_or_else(|| RegistryError::new(path.to_string(), RegistryErrorKind::NoNode))?;
        if version >= 0 && node.version != version {
            return Err(RegistryError::new(path.to_string(), RegistryErrorKind::BadVersion));
        }
        node.data = data.to_vec();
        node.version += 1;
        let stat = Stat {
            version: node.version,
            ephemeral: node.ephemeral,
        };

        let data_watch_armed = guard.data_watches.remove(path);
        drop(guard);
        if data_watch_armed {
            self.fire(RegistryEventKind::Changed, path);
        }
        Ok(stat)
    }

    fn get_children(&self, path: &str, watch: bool) -> RegistryResult<Vec<String>> {
        let mut guard = self.inner.lock().unwrap();
        let node = guard
            .nodes
            .get(path)
            .ok_or_else(|| RegistryError::new(path.to_string(), RegistryErrorKind::NoNode))?;
        let mut names: Vec<String> = node.children.iter().cloned().collect();
        names.sort();
        if watch {
            guard.child_watches.insert(path.to_string());
        }
        Ok(names)
    }

    fn sync(&self, path: &str) -> RegistryResult<()> {
        let guard = self.inner.lock().unwrap();
        if !guard.nodes.contains_key(path) && path != "/" {
            return Err(RegistryError::new(path.to_string(), RegistryErrorKind::NoNode));
        }
        Ok(())
    }

    fn events(&self) -> Receiver<RegistryEvent> {
        self.receiver
            .lock()
            .unwrap()
            .take()
            .expect("MemoryRegistry::events called more than once")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_read_round_trip() {
        let reg = MemoryRegistry::new();
        reg.create("/a", b"hello", CreateFlags::persistent()).unwrap();
        let (data, stat) = reg.get_data("/a", false).unwrap();
        assert_eq!(data, b"hello");
        assert_eq!(stat.version, 0);
    }

    #[test]
    fn sequential_creates_get_increasing_suffixes() {
        let reg = MemoryRegistry::new();
        reg.create("/parent", b"", CreateFlags::persistent()).unwrap();
        let p1 = reg
            .create("/parent/BID-", b"1", CreateFlags::sequential_ephemeral())
            .unwrap();
        let p2 = reg
            .create("/parent/BID-", b"2", CreateFlags::sequential_ephemeral())
            .unwrap();
        assert_eq!(p1, "/parent/BID-0000000000");
        assert_eq!(p2, "/parent/BID-0000000001");
    }

    #[test]
    fn watch_fires_once_on_data_change() {
        let reg = MemoryRegistry::new();
        reg.create("/a", b"x", CreateFlags::persistent()).unwrap();
        let events = reg.events();
        let _ = reg.get_data("/a", true).unwrap();
        reg.set_data("/a", b"y", -1).unwrap();
        let ev = events.recv().unwrap();
        assert_eq!(ev.path, "/a");
        assert_eq!(ev.kind, RegistryEventKind::Changed);

        // second change without re-arming should not fire
        reg.set_data("/a", b"z", -1).unwrap();
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn expire_session_drops_ephemerals() {
        let reg = MemoryRegistry::new();
        reg.create("/parent", b"", CreateFlags::persistent()).unwrap();
        reg.create("/parent/eph", b"", CreateFlags::ephemeral()).unwrap();
        assert!(reg.exists("/parent/eph", false).unwrap().is_some());
        reg.expire_session();
        assert!(reg.exists("/parent/eph", false).unwrap().is_none());
    }
}
