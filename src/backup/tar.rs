use crate::backup::compress::Compression;
use crate::backup::finish::Finish;
use crate::backup::result_error::result::Result;
use std::io::{BufWriter, IntoInnerError};
use std::path::Path;
use tempfile::NamedTempFile;

/// Packs `root/name` into a compressed tarball whose entries start with `name/`.
///
/// Returns the temporary file holding the archive; it is removed on drop.
pub fn pack_directory(root: &Path, name: &str, compression: Compression) -> Result<NamedTempFile> {
    let mut archive = tempfile::Builder::new()
        .suffix(&format!(".{}", compression.extension()))
        .tempfile()?;

    let mut writer = compression
        .build_compressor(BufWriter::new(archive.as_file_mut()))
        .map(BufWriter::new)
        .map(tar::Builder::new)?;
    writer.follow_symlinks(false);
    writer.append_dir_all(name, root.join(name))?;

    writer
        .into_inner()?
        .into_inner()
        .map_err(IntoInnerError::into_error)?
        .finish()?
        .into_inner()
        .map_err(IntoInnerError::into_error)?;

    tracing::debug!("Packed {:?} into {:?}", root.join(name), archive.path());
    Ok(archive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use liblzma::read::XzDecoder;
    use std::fs::File;
    use std::io::Read;

    fn staged_folder() -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        let staged = root.path().join("web1_www");
        std::fs::create_dir_all(staged.join("static")).unwrap();
        std::fs::write(staged.join("index.html"), "<html/>").unwrap();
        std::fs::write(staged.join("static/app.js"), "run()").unwrap();
        std::fs::write(staged.join(".backup_date"), "").unwrap();
        root
    }

    fn entry_names<R: Read>(reader: R) -> Vec<String> {
        let mut names: Vec<String> = tar::Archive::new(reader)
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_pack_directory_gzip() {
        let root = staged_folder();
        let archive = pack_directory(root.path(), "web1_www", Compression::Gzip).unwrap();
        assert!(archive.path().to_string_lossy().ends_with(".tgz"));

        let names = entry_names(GzDecoder::new(File::open(archive.path()).unwrap()));
        assert!(names.contains(&"web1_www/index.html".to_string()));
        assert!(names.contains(&"web1_www/static/app.js".to_string()));
        assert!(names.contains(&"web1_www/.backup_date".to_string()));
    }

    #[test]
    fn test_pack_directory_xz() {
        let root = staged_folder();
        let archive = pack_directory(root.path(), "web1_www", Compression::Xz).unwrap();
        assert!(archive.path().to_string_lossy().ends_with(".txz"));

        let names = entry_names(XzDecoder::new(File::open(archive.path()).unwrap()));
        assert!(names.contains(&"web1_www/index.html".to_string()));
    }

    #[test]
    fn test_pack_missing_directory_fails() {
        let root = tempfile::tempdir().unwrap();
        assert!(pack_directory(root.path(), "absent", Compression::Gzip).is_err());
    }
}
