//! 任务注册表
//!
//! 任务 ID 到下载任务的并发映射，调用方无需额外加锁

use crate::downloader::task::DownloadTask;
use crate::error::{DownloadError, DownloadResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: DashMap<String, Arc<DownloadTask>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册新任务，ID 已存在时拒绝
    pub fn insert_new(&self, task: Arc<DownloadTask>) -> DownloadResult<()> {
        match self.tasks.entry(task.id().to_string()) {
            Entry::Occupied(_) => Err(DownloadError::DuplicateId(task.id().to_string())),
            Entry::Vacant(slot) => {
                slot.insert(task);
                Ok(())
            }
        }
    }

    /// 注册任务，覆盖同 ID 的旧任务并返回它
    pub fn put(&self, task: Arc<DownloadTask>) -> Option<Arc<DownloadTask>> {
        self.tasks.insert(task.id().to_string(), task)
    }

    pub fn get(&self, id: &str) -> Option<Arc<DownloadTask>> {
        self.tasks.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, id: &str) -> Option<Arc<DownloadTask>> {
        self.tasks.remove(id).map(|(_, task)| task)
    }

    /// 仅当任务已处于终态时移除
    pub fn remove_terminal(&self, id: &str) -> Option<Arc<DownloadTask>> {
        self.tasks
            .remove_if(id, |_, task| task.is_terminal())
            .map(|(_, task)| task)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    /// 当前所有任务的快照
    ///
    /// 返回的是任务句柄列表，迭代期间的并发写入不会破坏结果
    pub fn list(&self) -> Vec<Arc<DownloadTask>> {
        self.tasks
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// 移除并返回所有任务
    pub fn drain(&self) -> Vec<Arc<DownloadTask>> {
        let ids: Vec<String> = self.tasks.iter().map(|entry| entry.key().clone()).collect();
        ids.iter().filter_map(|id| self.remove(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::task::DownloadRequest;
    use tokio_util::sync::CancellationToken;

    fn task(id: &str) -> Arc<DownloadTask> {
        let descriptor = DownloadRequest::new(id, "http://x/f", "t", "f", "/tmp/f", "web")
            .validate()
            .unwrap();
        Arc::new(DownloadTask::new(descriptor, CancellationToken::new()))
    }

    #[test]
    fn test_insert_get_remove() {
        let registry = TaskRegistry::new();
        registry.insert_new(task("d1")).unwrap();

        assert!(registry.contains("d1"));
        assert_eq!(registry.get("d1").unwrap().id(), "d1");
        assert!(registry.get("d2").is_none());

        assert!(registry.remove("d1").is_some());
        assert!(registry.remove("d1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = TaskRegistry::new();
        let first = task("d1");
        registry.insert_new(first.clone()).unwrap();

        let err = registry.insert_new(task("d1")).unwrap_err();
        assert!(matches!(err, DownloadError::DuplicateId(ref id) if id == "d1"));
        assert!(Arc::ptr_eq(&registry.get("d1").unwrap(), &first));
    }

    #[test]
    fn test_put_replaces() {
        let registry = TaskRegistry::new();
        let first = task("d1");
        assert!(registry.put(first.clone()).is_none());

        let replaced = registry.put(task("d1")).unwrap();
        assert!(Arc::ptr_eq(&replaced, &first));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_terminal() {
        let registry = TaskRegistry::new();
        let t = task("d1");
        registry.insert_new(t.clone()).unwrap();

        assert!(registry.remove_terminal("d1").is_none());
        t.cancel();
        assert!(registry.remove_terminal("d1").is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_list_and_drain() {
        let registry = TaskRegistry::new();
        for i in 0..5 {
            registry.insert_new(task(&format!("d{}", i))).unwrap();
        }

        let mut ids: Vec<String> = registry.list().iter().map(|t| t.id().to_string()).collect();
        ids.sort();
        assert_eq!(ids, vec!["d0", "d1", "d2", "d3", "d4"]);

        assert_eq!(registry.drain().len(), 5);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        let registry = Arc::new(TaskRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let id = format!("t{}-{}", n, i);
                        registry.insert_new(task(&id)).unwrap();
                        let _ = registry.list();
                        if i % 2 == 0 {
                            registry.remove(&id);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 8 * 50);
    }
}
