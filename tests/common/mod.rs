#![allow(dead_code)]

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use xtipipe::settings::{AppConfig, ToolCommand};

pub const OBSID: &str = "3013010102";
pub const CALDB: &str = "xti20240206";

pub fn utf8_root(dir: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8Path::from_path(dir.path()).unwrap().to_path_buf()
}

fn push_card(out: &mut Vec<u8>, card: &str) {
    out.extend(format!("{card:<80}").bytes().take(80));
}

fn push_header(out: &mut Vec<u8>, first: &str, cards: &[(&str, &str)]) {
    let start = out.len();
    push_card(out, first);
    for (key, value) in cards {
        push_card(out, &format!("{key:<8}= {value:>20}"));
    }
    push_card(out, "END");
    let used = out.len() - start;
    out.resize(start + used.div_ceil(2880) * 2880, b' ');
}

/// Event file with an empty primary HDU and one small binary table.
pub fn write_fits(path: &Utf8Path, primary: &[(&str, &str)], extension: &[(&str, &str)]) {
    let mut out = Vec::new();
    let mut primary_cards = vec![("BITPIX", "8"), ("NAXIS", "0")];
    primary_cards.extend_from_slice(primary);
    push_header(&mut out, "SIMPLE  =                    T", &primary_cards);

    let mut ext_cards = vec![
        ("BITPIX", "8"),
        ("NAXIS", "2"),
        ("NAXIS1", "4"),
        ("NAXIS2", "1"),
        ("PCOUNT", "0"),
        ("GCOUNT", "1"),
    ];
    ext_cards.extend_from_slice(extension);
    push_header(&mut out, "XTENSION= 'BINTABLE'", &ext_cards);
    let start = out.len();
    out.resize(start + 2880, 0);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, out).unwrap();
}

/// Cleaned event file of the Crab observation, reduced with `caldb`.
pub fn write_crab_event(path: &Utf8Path, caldb: &str) {
    let caldb = format!("'{caldb}'");
    write_fits(
        path,
        &[
            ("OBS_ID", "'3013010102'"),
            ("OBJECT", "'PSR_B0531+21'"),
            ("RA_OBJ", "83.63308"),
            ("DEC_OBJ", "22.01450"),
            ("DATE-OBS", "'2013-01-20T03:10:00'"),
        ],
        &[("CALDBVER", caldb.as_str())],
    );
}

/// `OBSID,TIME,RA,DEC` catalog file.
pub fn write_catalog(path: &Utf8Path, rows: &[(&str, f64)]) {
    let mut content = String::from("OBSID,TIME,RA,DEC\n");
    for (obsid, mjd) in rows {
        content.push_str(&format!("{obsid},{mjd},83.63308,22.01450\n"));
    }
    fs::write(path, content).unwrap();
}

/// Archive mirror holding one observation under `2013_01/`, auxiliary
/// files compressed as the archive serves them.
pub fn write_mirror(root: &Utf8Path, obsid: &str) {
    let obs = root.join("2013_01").join(obsid);
    for (file, content) in [
        (format!("xti/event_uf/ni{obsid}_0mpu0_uf.evt"), "uf events"),
        (format!("xti/hk/ni{obsid}_0mpu0.hk"), "housekeeping"),
        (format!("log/ni{obsid}_errlog.html"), "log"),
        (format!("auxil/ni{obsid}.orb.gz"), "orbit"),
        (format!("auxil/ni{obsid}.att.gz"), "attitude"),
    ] {
        let path = obs.join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
}

fn script(dir: &Utf8Path, name: &str, body: &str) -> ToolCommand {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    ToolCommand::parse(&format!("sh {path}"))
}

/// Configuration running shell stand-ins for the HEASoft tools.
///
/// * reduction: copies `template` as the cleaned events of the dataset named
///   after the working directory, writes a merged `ufa` file and appends its
///   arguments to `<tools_dir>/reduction.calls`,
/// * correction: copies `infile` to `outfile`,
/// * version query: prints `caldb`.
pub fn fake_tools(tools_dir: &Utf8Path, template: &Utf8Path, caldb: &str) -> AppConfig {
    fs::create_dir_all(tools_dir).unwrap();
    let calls = tools_dir.join("reduction.calls");
    let mut config = AppConfig::default();
    config.tools.reduction = script(
        tools_dir,
        "fake_nicerl2.sh",
        &format!(
            "obsid=$(basename \"$PWD\")\n\
             echo \"$@\" >> {calls}\n\
             mkdir -p xti/event_cl\n\
             cp {template} xti/event_cl/ni${{obsid}}_0mpu7_cl.evt\n\
             printf 'merged' > xti/event_cl/ni${{obsid}}_0mpu7_ufa.evt\n"
        ),
    );
    config.tools.correction = script(
        tools_dir,
        "fake_barycorr.sh",
        "for arg in \"$@\"; do\n\
         case $arg in\n\
         infile=*) infile=${arg#infile=} ;;\n\
         outfile=*) outfile=${arg#outfile=} ;;\n\
         esac\n\
         done\n\
         cp \"$infile\" \"$outfile\"\n",
    );
    config.tools.caldb_query = script(tools_dir, "fake_nicaldbver.sh", &format!("echo {caldb}\n"));
    config
}

/// Number of reduction runs recorded by [`fake_tools`].
pub fn reduction_calls(tools_dir: &Utf8Path) -> usize {
    fs::read_to_string(tools_dir.join("reduction.calls"))
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

/// Names in `dir` ending with `suffix`.
pub fn names_ending(dir: &Utf8Path, suffix: &str) -> Vec<String> {
    let mut names: Vec<String> = dir
        .read_dir_utf8()
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string())
        .filter(|n| n.ends_with(suffix))
        .collect();
    names.sort();
    names
}
