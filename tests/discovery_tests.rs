use assert_fs::prelude::*;
use assert_fs::TempDir;
use gitfolder::discovery::normalize_path;
use gitfolder::RepoScanner;
use predicates::prelude::*;

/// Layout:
///   Project/.git
///   Project/Assets/Shared/.git
///   Project/Assets/Shared/Nested/.git
///   Project/Assets/Art/Textures/.git
///   Project/Assets/.cache/Temp/.git
fn project_tree() -> TempDir {
    let temp = TempDir::new().unwrap();
    for repo in [
        "Project",
        "Project/Assets/Shared",
        "Project/Assets/Shared/Nested",
        "Project/Assets/Art/Textures",
        "Project/Assets/.cache/Temp",
    ] {
        temp.child(repo).child(".git").create_dir_all().unwrap();
    }
    temp.child("Project/Assets/Art/readme.txt")
        .write_str("not a repo\n")
        .unwrap();
    temp
}

#[test]
fn test_scan_above_repository_does_not_descend_into_it() {
    let temp = project_tree();

    let roots = RepoScanner::new().find_repository_roots(temp.path()).unwrap();

    assert_eq!(roots, vec![normalize_path(temp.child("Project").path())]);
}

#[test]
fn test_scan_inside_nested_repository_finds_it() {
    let temp = project_tree();
    let nested = temp.child("Project/Assets/Shared/Nested");

    let roots = RepoScanner::new().find_repository_roots(nested.path()).unwrap();

    assert_eq!(roots, vec![normalize_path(nested.path())]);
}

#[test]
fn test_scan_below_enclosing_repository() {
    let temp = project_tree();
    let assets = temp.child("Project/Assets");

    let roots = RepoScanner::new().find_repository_roots(assets.path()).unwrap();

    // Nested lives inside Shared and .cache is hidden
    assert_eq!(
        roots,
        vec![
            normalize_path(assets.child("Art/Textures").path()),
            normalize_path(assets.child("Shared").path()),
        ]
    );
    for root in &roots {
        assert!(predicate::path::is_dir().eval(&root.join(".git")));
    }
}

#[test]
fn test_sync_roots_appends_enclosing_repository() {
    let temp = project_tree();
    let assets = temp.child("Project/Assets");

    let roots = RepoScanner::new().sync_roots(assets.path(), true).unwrap();

    assert_eq!(roots.len(), 3);
    assert_eq!(roots.last(), Some(&normalize_path(temp.child("Project").path())));
}

#[test]
fn test_hidden_folders_included_on_request() {
    let temp = project_tree();
    let assets = temp.child("Project/Assets");

    let roots = RepoScanner::new()
        .with_skip_hidden(false)
        .find_repository_roots(assets.path())
        .unwrap();

    assert_eq!(roots.len(), 3);
    assert!(roots
        .iter()
        .any(|r| predicate::str::ends_with("Temp").eval(&r.to_string_lossy())));
}

#[test]
fn test_enclosing_repository_of_subfolder() {
    let temp = project_tree();
    let art = temp.child("Project/Assets/Art");

    let enclosing = RepoScanner::new().find_enclosing_repository_root(art.path());

    assert_eq!(enclosing, Some(normalize_path(temp.child("Project").path())));
}

#[cfg(unix)]
#[test]
fn test_symlinked_directories_are_not_followed() {
    let temp = project_tree();
    let outside = TempDir::new().unwrap();
    outside.child("Linked/.git").create_dir_all().unwrap();
    let scan = temp.child("Scan");
    scan.create_dir_all().unwrap();
    std::os::unix::fs::symlink(outside.child("Linked").path(), scan.child("Linked").path())
        .unwrap();

    let roots = RepoScanner::new().find_repository_roots(scan.path()).unwrap();

    assert!(roots.is_empty());
}
