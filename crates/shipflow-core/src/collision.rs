//! 上書き防止チェック
//!
//! リリース済みの完全バージョンがレジストリに既に存在する場合、
//! イメージを変更する前に実行を止めます。
//!
//! このチェックは助言的なものでトランザクションではありません。
//! 同じバージョンを並行してビルドする2つの実行の間では、タグ一覧の取得から
//! プッシュまでの間に競合 (TOCTOU) が残ります。レジストリ側に条件付き
//! プッシュがない限り、これは既知の制約として扱います。

use crate::error::TagError;
use crate::model::AuroraVersion;
use crate::provider::ImageInfoProvider;

/// 完全バージョンがまだ公開されていないことを確認
///
/// スナップショットは常に上書き可能なので問い合わせません。
/// タグ一覧は呼び出しごとに取得し直します。
pub async fn ensure_not_published(
    provider: &dyn ImageInfoProvider,
    repository: &str,
    version: &AuroraVersion,
) -> Result<(), TagError> {
    if version.is_snapshot() {
        return Ok(());
    }

    let complete_version = version.complete_version();
    let existing = provider
        .get_tags(repository)
        .await
        .map_err(|source| TagError::Registry {
            repository: repository.to_string(),
            source,
        })?;

    tracing::debug!(
        repository,
        existing = existing.tags.len(),
        "Checking {} against existing tags",
        complete_version
    );

    if existing.contains(&complete_version) {
        return Err(TagError::Collision {
            repository: repository.to_string(),
            tag: complete_version,
        });
    }

    Ok(())
}
