use super::{DecodePolicy, Exchange, HistoryStore, MemoryDocument, UserId};
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

// ── InMemoryHistoryStore ──────────────────────────────────────────────────────

/// 进程内存 Store，不持久化，适合测试和临时会话
pub struct InMemoryHistoryStore {
    data: RwLock<MemoryDocument>,
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(MemoryDocument::new()),
        }
    }

    /// 以已有文档为初始状态
    pub fn with_document(document: MemoryDocument) -> Self {
        Self {
            data: RwLock::new(document),
        }
    }

    pub async fn snapshot(&self) -> MemoryDocument {
        self.data.read().await.clone()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn get_history(&self, user: &UserId) -> Result<Vec<Exchange>> {
        Ok(self.data.read().await.history(user).to_vec())
    }

    async fn append_exchange(&self, user: &UserId, exchange: Exchange) -> Result<()> {
        self.data.write().await.append(user, exchange);
        Ok(())
    }

    async fn users(&self) -> Result<Vec<UserId>> {
        Ok(self.data.read().await.users().cloned().collect())
    }
}

// ── FileHistoryStore ──────────────────────────────────────────────────────────

/// 基于单个 JSON 文件的持久化 Store
///
/// 不做内存缓存：每次访问都完整读取文件，每次修改都完整写回。
/// 所有读写都在同一把互斥锁内进行，因此同一用户的并发追加不会丢失，
/// 不同用户的追加也不会互相覆盖。写入先落到 `<file>.tmp` 再 rename，
/// 文档要么是旧版本要么是新版本，不会出现半截内容。
pub struct FileHistoryStore {
    path: PathBuf,
    policy: DecodePolicy,
    lock: Mutex<()>,
}

impl FileHistoryStore {
    /// 打开 Store，自动建父目录；文件不存在时在第一次写入时创建
    pub fn new(path: impl AsRef<Path>, policy: DecodePolicy) -> Result<Self> {
        let path = expand_tilde(path.as_ref());
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("创建目录失败: {e}")))?;
        }
        info!(path = %path.display(), policy = ?policy, "🗄️ FileHistoryStore 初始化");
        Ok(Self {
            path,
            policy,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取并解析整个文档，调用方必须持有 `lock`
    async fn load(&self) -> Result<MemoryDocument> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(MemoryDocument::new());
            }
            Err(e) => {
                return Err(StoreError::Io(format!("读取记忆文件失败: {e}")).into());
            }
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(MemoryDocument::new());
        }
        // 非 UTF-8 内容同样按解析失败处理，走 DecodePolicy
        match serde_json::from_slice::<MemoryDocument>(&raw) {
            Ok(doc) => Ok(doc),
            Err(e) => match self.policy {
                DecodePolicy::Fail => Err(StoreError::Decode {
                    path: self.path.display().to_string(),
                    message: e.to_string(),
                }
                .into()),
                DecodePolicy::ResetEmpty => {
                    warn!(path = %self.path.display(), error = %e, "记忆文件解析失败，重置为空文档");
                    let doc = MemoryDocument::new();
                    self.persist(&doc).await?;
                    Ok(doc)
                }
            },
        }
    }

    /// 整文档写回，调用方必须持有 `lock`
    async fn persist(&self, doc: &MemoryDocument) -> Result<()> {
        let json = serde_json::to_string_pretty(doc)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| StoreError::Io(format!("写入临时文件失败: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Io(format!("替换记忆文件失败: {e}")))?;
        debug!(
            path = %self.path.display(),
            users = doc.user_count(),
            exchanges = doc.exchange_count(),
            "💾 记忆已持久化"
        );
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "memory.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn get_history(&self, user: &UserId) -> Result<Vec<Exchange>> {
        let _guard = self.lock.lock().await;
        let doc = self.load().await?;
        Ok(doc.history(user).to_vec())
    }

    async fn append_exchange(&self, user: &UserId, exchange: Exchange) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        doc.append(user, exchange);
        self.persist(&doc).await?;
        debug!(user = %user, total = doc.history(user).len(), "追加对话记录");
        Ok(())
    }

    async fn users(&self) -> Result<Vec<UserId>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.users().cloned().collect())
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/")
        && let Some(home) = std::env::var("HOME")
            .ok()
            .or_else(|| std::env::var("USERPROFILE").ok())
    {
        return PathBuf::from(home).join(rest);
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatError;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn file_store(policy: DecodePolicy) -> (FileHistoryStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHistoryStore::new(dir.path().join("memory.json"), policy).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_unknown_user_is_empty() {
        let (store, _dir) = file_store(DecodePolicy::Fail);
        let user = UserId::from("42");

        assert!(store.get_history(&user).await.unwrap().is_empty());
        assert!(!store.history_exists(&user).await.unwrap());
        assert!(!store.path().exists(), "只读访问不应创建文件");
    }

    #[tokio::test]
    async fn test_append_is_monotonic_and_ordered() {
        let (store, _dir) = file_store(DecodePolicy::Fail);
        let user = UserId::from("42");
        store
            .append_exchange(&user, Exchange::new("prior", "p"))
            .await
            .unwrap();

        for i in 0..5 {
            store
                .append_exchange(&user, Exchange::new(format!("in {i}"), format!("out {i}")))
                .await
                .unwrap();
        }

        let history = store.get_history(&user).await.unwrap();
        assert_eq!(history.len(), 6);
        assert_eq!(history[0].input, "prior");
        for i in 0..5 {
            assert_eq!(history[i + 1], Exchange::new(format!("in {i}"), format!("out {i}")));
        }
        assert!(store.history_exists(&user).await.unwrap());
    }

    #[tokio::test]
    async fn test_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("memory.json");
        let user = UserId::from("7");
        {
            let store = FileHistoryStore::new(&path, DecodePolicy::Fail).unwrap();
            store
                .append_exchange(&user, Exchange::new("hi", "hello"))
                .await
                .unwrap();
        }
        let reopened = FileHistoryStore::new(&path, DecodePolicy::Fail).unwrap();
        assert_eq!(
            reopened.get_history(&user).await.unwrap(),
            vec![Exchange::new("hi", "hello")]
        );
        assert_eq!(reopened.users().await.unwrap(), vec![user]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_same_user_lose_nothing() {
        let (store, _dir) = file_store(DecodePolicy::Fail);
        let store = Arc::new(store);
        let user = UserId::from("42");

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let store = store.clone();
                let user = user.clone();
                tokio::spawn(async move {
                    store
                        .append_exchange(&user, Exchange::new(format!("m{i}"), "r"))
                        .await
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let history = store.get_history(&user).await.unwrap();
        assert_eq!(history.len(), 32, "并发追加不应丢失任何记录");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_different_users() {
        let (store, _dir) = file_store(DecodePolicy::Fail);
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .flat_map(|u| (0..4).map(move |i| (u, i)))
            .map(|(u, i)| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .append_exchange(&UserId::from(u as u64), Exchange::new(format!("{i}"), "r"))
                        .await
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(store.users().await.unwrap().len(), 8);
        for u in 0..8u64 {
            assert_eq!(store.get_history(&UserId::from(u)).await.unwrap().len(), 4);
        }
    }

    #[tokio::test]
    async fn test_empty_history_counts_as_uninitialized() {
        let (store, _dir) = file_store(DecodePolicy::Fail);
        std::fs::write(store.path(), r#"{"42": []}"#).unwrap();

        let user = UserId::from("42");
        assert!(!store.history_exists(&user).await.unwrap());
        assert_eq!(store.users().await.unwrap(), vec![user]);
    }

    #[tokio::test]
    async fn test_blank_file_is_empty_document() {
        let (store, _dir) = file_store(DecodePolicy::Fail);
        std::fs::write(store.path(), "  \n").unwrap();
        assert!(store.get_history(&UserId::from("1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_document_with_recovery() {
        let (store, _dir) = file_store(DecodePolicy::ResetEmpty);
        std::fs::write(store.path(), "{\"42\": [{\"input\": ").unwrap();
        let user = UserId::from("42");

        assert!(store.get_history(&user).await.unwrap().is_empty());
        let on_disk = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(on_disk.trim(), "{}", "恢复后应立即写入空文档");

        store
            .append_exchange(&user, Exchange::new("hi", "hello"))
            .await
            .unwrap();
        assert_eq!(store.get_history(&user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_document_without_recovery() {
        let (store, _dir) = file_store(DecodePolicy::Fail);
        let corrupt = "not json at all";
        std::fs::write(store.path(), corrupt).unwrap();
        let user = UserId::from("42");

        let err = store.get_history(&user).await.unwrap_err();
        assert!(matches!(err, ChatError::Store(StoreError::Decode { .. })));

        let err = store
            .append_exchange(&user, Exchange::new("hi", "hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Store(StoreError::Decode { .. })));
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), corrupt, "不应发生写入");
    }

    #[tokio::test]
    async fn test_wrong_shape_is_decode_error() {
        let (store, _dir) = file_store(DecodePolicy::Fail);
        std::fs::write(store.path(), r#"{"42": "not a list"}"#).unwrap();
        assert!(store.get_history(&UserId::from("42")).await.is_err());
    }

    #[tokio::test]
    async fn test_non_utf8_document_follows_decode_policy() {
        let garbage: &[u8] = &[0xff, 0xfe, b'{', 0x80];
        let user = UserId::from("42");

        let (strict, _dir) = file_store(DecodePolicy::Fail);
        std::fs::write(strict.path(), garbage).unwrap();
        let err = strict.get_history(&user).await.unwrap_err();
        assert!(matches!(err, ChatError::Store(StoreError::Decode { .. })));
        assert_eq!(std::fs::read(strict.path()).unwrap(), garbage, "不应发生写入");

        let (lenient, _dir) = file_store(DecodePolicy::ResetEmpty);
        std::fs::write(lenient.path(), garbage).unwrap();
        assert!(lenient.get_history(&user).await.unwrap().is_empty());
        assert_eq!(std::fs::read_to_string(lenient.path()).unwrap().trim(), "{}");
        lenient
            .append_exchange(&user, Exchange::new("hi", "hello"))
            .await
            .unwrap();
        assert_eq!(lenient.get_history(&user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryHistoryStore::new();
        let user = UserId::from("a");
        assert!(!store.history_exists(&user).await.unwrap());

        store
            .append_exchange(&user, Exchange::new("1", "x"))
            .await
            .unwrap();
        store
            .append_exchange(&user, Exchange::new("2", "y"))
            .await
            .unwrap();

        let history = store.get_history(&user).await.unwrap();
        assert_eq!(history.iter().map(|e| e.input.as_str()).collect::<Vec<_>>(), vec!["1", "2"]);
        assert_eq!(store.snapshot().await.exchange_count(), 2);
    }

    #[test]
    fn test_tmp_path_sits_next_to_document() {
        let store = FileHistoryStore::new("/tmp/mass-chatbot-test/memory.json", DecodePolicy::Fail)
            .unwrap();
        assert_eq!(
            store.tmp_path(),
            PathBuf::from("/tmp/mass-chatbot-test/memory.json.tmp")
        );
    }
}
