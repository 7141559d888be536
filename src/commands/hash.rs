use std::path::PathBuf;

use tracing::info;

use pyindex::hashes::{hash_file, HashAlgorithm};

pub async fn hash(
    file: PathBuf,
    algorithm: HashAlgorithm,
    expect: Option<String>,
) -> anyhow::Result<()> {
    let path = file.clone();
    let (digest, length) =
        tokio::task::spawn_blocking(move || hash_file(&path, algorithm)).await??;

    info!("Hashed {} bytes of {}", length, file.display());
    println!("{}={}", algorithm, digest);

    if let Some(expected) = expect {
        if !digest.eq_ignore_ascii_case(expected.trim()) {
            anyhow::bail!(
                "{} digest mismatch for {}: expected {}, got {}",
                algorithm,
                file.display(),
                expected,
                digest
            );
        }
        info!("Digest matches");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[tokio::test]
    async fn test_hash_expectation() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello\n").unwrap();
        f.flush().unwrap();

        let good = "5891B5B522D5DF086D0FF0B110FBD9D21BB4FC7163AF34D08286A2E846F6BE03".to_string();
        hash(f.path().to_path_buf(), HashAlgorithm::Sha256, Some(good))
            .await
            .unwrap();

        let bad = "00".to_string();
        assert!(hash(f.path().to_path_buf(), HashAlgorithm::Sha256, Some(bad))
            .await
            .is_err());
    }
}
