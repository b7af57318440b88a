use std::{
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    #[error("Could not read {0}")]
    Read(PathBuf),
    #[error("Invalid glob pattern '{0}'")]
    BadPattern(String),
    #[error("Could not move {src} to {dest}")]
    Move { src: PathBuf, dest: PathBuf },
}

/// Read a list of netCDF HREFs, one per line.
///
/// Blank lines and lines starting with `#` are skipped. Local entries containing glob
/// characters are expanded (sorted); URLs are passed through untouched.
pub fn read_href_list(list_file: &Path) -> error_stack::Result<Vec<String>, UtilError> {
    let f = std::fs::File::open(list_file)
        .map_err(|e| error_stack::Report::new(UtilError::Read(list_file.to_path_buf())).attach_printable(e))?;
    let rdr = BufReader::new(f);

    let mut hrefs = vec![];
    for line in rdr.lines() {
        let line = line
            .map_err(|e| error_stack::Report::new(UtilError::Read(list_file.to_path_buf())).attach_printable(e))?;
        let value = line.trim();
        if value.is_empty() || value.starts_with('#') {
            continue;
        }

        if crate::hrefs::is_remote(value) || !value.contains(['*', '?', '[']) {
            hrefs.push(value.to_string());
            continue;
        }

        let mut matches = glob::glob(value)
            .map_err(|e| error_stack::Report::new(UtilError::BadPattern(value.to_string())).attach_printable(e))?
            .filter_map(|entry| match entry {
                Ok(p) => Some(p.to_string_lossy().to_string()),
                Err(e) => {
                    log::warn!("Skipping unreadable match for {value}: {e}");
                    None
                }
            })
            .collect::<Vec<_>>();
        if matches.is_empty() {
            log::warn!("Pattern {value} in {} matched no files", list_file.display());
        }
        matches.sort();
        hrefs.extend(matches);
    }
    Ok(hrefs)
}

/// Move a local asset file into `item_dir`, keeping its file name, and return the new path.
///
/// If a file of that name is already in `item_dir` and `ignore_conflicts` is `true`, the
/// existing file is kept and the source is left in place; otherwise it is overwritten.
/// Falls back to copy-and-delete when a rename is not possible (e.g. across filesystems).
pub fn move_asset_file_to_item(asset: &Path, item_dir: &Path, ignore_conflicts: bool) -> error_stack::Result<PathBuf, UtilError> {
    let move_err = |dest: &Path| UtilError::Move { src: asset.to_path_buf(), dest: dest.to_path_buf() };
    let file_name = asset.file_name()
        .ok_or_else(|| move_err(item_dir))?;
    let dest = item_dir.join(file_name);

    if dest == asset {
        return Ok(dest);
    }
    if dest.exists() && ignore_conflicts {
        log::info!("{} already exists, not moving {}", dest.display(), asset.display());
        return Ok(dest);
    }

    std::fs::create_dir_all(item_dir)
        .map_err(|e| error_stack::Report::new(move_err(&dest)).attach_printable(e))?;
    if std::fs::rename(asset, &dest).is_err() {
        std::fs::copy(asset, &dest)
            .map_err(|e| error_stack::Report::new(move_err(&dest)).attach_printable(e))?;
        std::fs::remove_file(asset)
            .map_err(|e| error_stack::Report::new(move_err(&dest)).attach_printable(e))?;
    }
    log::debug!("Moved {} to {}", asset.display(), dest.display());
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_href_list() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["nclimgrid_prcp.nc", "prcp-202201-grd-prelim.nc", "prcp-202202-grd-prelim.nc"] {
            std::fs::write(tmp.path().join(name), b"").unwrap();
        }
        let list = tmp.path().join("hrefs.txt");
        let pattern = tmp.path().join("prcp-2022*.nc");
        std::fs::write(&list, format!(
            "# monthly\n{}\n\n  https://host/nclimgrid_tavg.nc  \n{}\n",
            tmp.path().join("nclimgrid_prcp.nc").display(),
            pattern.display(),
        )).unwrap();

        let hrefs = read_href_list(&list).unwrap();
        assert_eq!(hrefs.len(), 4);
        assert!(hrefs[0].ends_with("nclimgrid_prcp.nc"));
        assert_eq!(hrefs[1], "https://host/nclimgrid_tavg.nc");
        assert!(hrefs[2].ends_with("prcp-202201-grd-prelim.nc"));
        assert!(hrefs[3].ends_with("prcp-202202-grd-prelim.nc"));
    }

    #[test]
    fn test_move_asset_ignores_conflicts() {
        let tmp = tempfile::tempdir().unwrap();
        let item_dir = tmp.path().join("item");
        std::fs::create_dir_all(&item_dir).unwrap();
        let src = tmp.path().join("a.tif");
        std::fs::write(&src, b"new").unwrap();
        std::fs::write(item_dir.join("a.tif"), b"old").unwrap();

        let dest = move_asset_file_to_item(&src, &item_dir, true).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"old");
        assert!(src.exists());

        let dest = move_asset_file_to_item(&src, &item_dir, false).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
        assert!(!src.exists());
    }
}
