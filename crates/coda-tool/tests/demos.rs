use coda_tool::{assert_case, demo_dirs};

#[test]
fn every_demo_matches_its_testcase() {
    let dirs = demo_dirs();
    assert!(!dirs.is_empty(), "expected demo script directories");

    for dir in dirs {
        let case_path = dir.join("testcase.json");
        if let Err(error) = assert_case(&dir, &case_path) {
            panic!("demo {} failed: {}", dir.display(), error);
        }
    }
}
