//! Named fault scenarios and the menu to pick them from

use std::{
    io::{self, BufRead, Write},
    path::Path,
};

use gptp_abnormal::FaultSpec;

use crate::{
    cli::parse_fault_args,
    config::{ConfigError, ScenarioConfig, ScenarioFile},
};

#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub title: String,
    /// State machines of the daemon whose behavior the scenario exercises
    pub state_machines: Vec<String>,
    pub faults: Vec<FaultSpec>,
    /// What the operator should see
    pub comment: String,
}

impl From<ScenarioConfig> for Scenario {
    fn from(config: ScenarioConfig) -> Self {
        Self {
            title: config.title,
            state_machines: config.state_machines,
            faults: config.faults,
            comment: config.comment,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("scenario '{title}': {source}")]
    Arguments {
        title: &'static str,
        #[source]
        source: clap::Error,
    },
    #[error(transparent)]
    File(#[from] ConfigError),
}

struct Builtin {
    title: &'static str,
    state_machines: &'static [&'static str],
    faults: &'static [&'static [&'static str]],
    comment: &'static str,
}

const SYNC_RECEIVE: &[&str] = &[
    "md_sync_receive_sm",
    "port_sync_sync_receive_sm",
    "port_announce_information_sm",
];

const BUILTIN: &[Builtin] = &[
    Builtin {
        title: "Normal Run",
        state_machines: &["all"],
        faults: &[&["-m", "sync", "-e", "none", "-d", "10"]],
        comment: "Run without any error injection.",
    },
    Builtin {
        title: "missing Sync",
        state_machines: SYNC_RECEIVE,
        faults: &[&["-m", "sync", "-e", "skip", "-d", "5"]],
        comment: "\
Skip sending Sync from the master side.
After 3 Sync intervals port_announce_information detects the AGED status
and the GM changes. The next Announce changes the GM back again.",
    },
    Builtin {
        title: "missing Sync and Announce",
        state_machines: SYNC_RECEIVE,
        faults: &[
            &["-m", "sync", "-e", "skip", "-d", "5"],
            &["-m", "anno", "-e", "skip", "-d", "5"],
        ],
        comment: "\
Skip sending Sync and Announce from the master side.
After 3 Sync intervals port_announce_information detects the AGED status
and the GM changes. No further GM change happens.",
    },
    Builtin {
        title: "missing Sync, SyncFup and Announce",
        state_machines: SYNC_RECEIVE,
        faults: &[
            &["-m", "sync", "-e", "skip", "-d", "5"],
            &["-m", "fup", "-e", "skip", "-d", "5"],
            &["-m", "anno", "-e", "skip", "-d", "5"],
        ],
        comment: "\
Skip sending Sync, FollowUp and Announce from the master side.
After 3 Sync intervals the GM changes.",
    },
    Builtin {
        title: "add 1 on Sync sequenceId, one time",
        state_machines: &["md_sync_receive_sm"],
        faults: &[&["-m", "sync", "-e", "bads", "-n", "1", "-r", "1", "-d", "5"]],
        comment: "Add 1 to the Sync sequenceId, just once.",
    },
    Builtin {
        title: "add 1 on SyncFup sequenceId, one time",
        state_machines: &["md_sync_receive_sm"],
        faults: &[&["-m", "fup", "-e", "bads", "-n", "1", "-r", "1", "-d", "5"]],
        comment: "Add 1 to the FollowUp sequenceId, just once.",
    },
    Builtin {
        title: "add 1 on SyncFup sequenceId, every time",
        state_machines: SYNC_RECEIVE,
        faults: &[&["-m", "fup", "-e", "bads", "-n", "1", "-d", "5"]],
        comment: "\
Add 1 to the FollowUp sequenceId, every time.
After 3 Sync intervals the GM changes.
The next Announce changes the GM back again.",
    },
    Builtin {
        title: "missing PDelayReq",
        state_machines: &["md_pdelay_resp_sm"],
        faults: &[&["-m", "pdreq", "-e", "skip", "-d", "15", "-t", "5"]],
        comment: "\
Skip sending PDelayRequest from the master side.
After 9 seconds (allowedLostResponses) the master side shows 'reset asCapable'
and the GM changes.",
    },
    Builtin {
        title: "missing PDelayResponse",
        state_machines: &["md_pdelay_req_sm"],
        faults: &[&["-m", "pdres", "-e", "skip", "-d", "15"]],
        comment: "\
Skip sending PDelayResponse from the master side.
After 9 seconds (allowedLostResponses) the console shows 'reset asCapable'.",
    },
    Builtin {
        title: "add 1 on PDelayResponse sequenceId, one time",
        state_machines: &["md_pdelay_req_sm"],
        faults: &[&["-m", "pdres", "-e", "bads", "-n", "1", "-d", "15", "-r", "1"]],
        comment: "Add 1 to the PDelayResponse sequenceId, just once.",
    },
    Builtin {
        title: "add 1 on PDelayResponse sequenceId, every time",
        state_machines: &["md_pdelay_req_sm"],
        faults: &[&["-m", "pdres", "-e", "bads", "-n", "1", "-d", "15"]],
        comment: "\
Add 1 to the PDelayResponse sequenceId, every time.
After 9 seconds (allowedLostResponses) the console shows 'reset asCapable'.",
    },
    Builtin {
        title: "Abandon SYNC TxTS, 2 times",
        state_machines: &["md_sync_send_sm"],
        faults: &[&["-m", "sync", "-e", "nots", "-d", "5", "-r", "2"]],
        comment: "\
Abandon the Sync transmit timestamp 2 times.
This does not change the GM.",
    },
    Builtin {
        title: "Abandon SYNC TxTS, every time",
        state_machines: &["md_sync_send_sm"],
        faults: &[&["-m", "sync", "-e", "nots", "-d", "5"]],
        comment: "\
Abandon the Sync transmit timestamp every time.
This changes the GM.",
    },
    Builtin {
        title: "Abandon PDelayReq TxTS, 3 times",
        state_machines: &["md_pdelay_req_sm"],
        faults: &[&["-m", "pdreq", "-e", "nots", "-d", "5", "-r", "3"]],
        comment: "Abandon the PDelayRequest transmit timestamp 3 times.",
    },
    Builtin {
        title: "Abandon PDelayResp TxTS, 3 times",
        state_machines: &["md_pdelay_resp_sm"],
        faults: &[&["-m", "pdres", "-e", "nots", "-d", "5", "-r", "3"]],
        comment: "Abandon the PDelayResponse transmit timestamp 3 times.",
    },
    Builtin {
        title: "Sync send error",
        state_machines: &["md_sync_send_sm"],
        faults: &[&["-m", "sync", "-e", "sender", "-d", "5"]],
        comment: "Sending Sync fails (gptpnet_send returns -1).",
    },
];

/// The scenarios that come with the harness
pub fn builtin_scenarios() -> Result<Vec<Scenario>, ScenarioError> {
    BUILTIN
        .iter()
        .map(|builtin| -> Result<Scenario, ScenarioError> {
            let faults = builtin
                .faults
                .iter()
                .map(|args| parse_fault_args(args.iter().copied()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|source| ScenarioError::Arguments {
                    title: builtin.title,
                    source,
                })?;

            Ok(Scenario {
                title: builtin.title.to_owned(),
                state_machines: builtin
                    .state_machines
                    .iter()
                    .map(|name| (*name).to_owned())
                    .collect(),
                faults,
                comment: builtin.comment.to_owned(),
            })
        })
        .collect()
}

/// The scenarios of a TOML scenario file
pub fn file_scenarios(path: &Path) -> Result<Vec<Scenario>, ScenarioError> {
    let file = ScenarioFile::from_file(path)?;
    if !file.check() {
        log::warn!("{path:?} contains unusable scenarios");
    }

    Ok(file.scenarios.into_iter().map(Scenario::from).collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Quit,
    ShowComments,
    /// Index into the scenario list
    Run(usize),
    Invalid,
}

/// Interpret one line typed at the menu prompt
pub fn parse_selection(line: &str, count: usize) -> MenuChoice {
    let line = line.trim();

    if line.starts_with('c') {
        return MenuChoice::ShowComments;
    }

    match line.parse::<usize>() {
        Ok(0) => MenuChoice::Quit,
        Ok(n) if n <= count => MenuChoice::Run(n - 1),
        _ => MenuChoice::Invalid,
    }
}

pub fn render_menu<W: Write>(
    scenarios: &[Scenario],
    with_comments: bool,
    out: &mut W,
) -> io::Result<()> {
    let rule = "-".repeat(30);
    writeln!(out, "{rule}")?;

    for (i, scenario) in scenarios.iter().enumerate() {
        writeln!(out, "{}: {}", i + 1, scenario.title)?;
        if !with_comments {
            continue;
        }

        writeln!(out, "    {}", scenario.state_machines.join(","))?;
        for line in scenario.comment.lines().filter(|line| !line.trim().is_empty()) {
            writeln!(out, "    {}", line.trim())?;
        }
        writeln!(out, "{rule}")?;
    }

    Ok(())
}

/// Show the menu until the operator quits or the input ends
///
/// `run` is called with the chosen scenario, the menu input (which is also
/// the console of the run) and the output.
pub fn run_menu<R, W, F>(
    scenarios: &[Scenario],
    input: &mut R,
    out: &mut W,
    mut run: F,
) -> io::Result<()>
where
    R: BufRead,
    W: Write,
    F: FnMut(&Scenario, &mut R, &mut W),
{
    let mut with_comments = false;

    loop {
        render_menu(scenarios, with_comments, out)?;

        loop {
            write!(
                out,
                "\nSelect a number from the menu('0':quit, 'c':menu with comment) ?"
            )?;
            out.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                writeln!(out)?;
                return Ok(());
            }

            match parse_selection(&line, scenarios.len()) {
                MenuChoice::Quit => return Ok(()),
                MenuChoice::ShowComments => {
                    with_comments = true;
                    break;
                }
                MenuChoice::Run(index) => {
                    if let Some(scenario) = scenarios.get(index) {
                        log::info!("running scenario '{}'", scenario.title);
                        run(scenario, input, out);
                    }
                    break;
                }
                MenuChoice::Invalid => writeln!(out, "select from 0 to {}", scenarios.len())?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use gptp_abnormal::{EventType, MessageType};

    use super::*;
    use crate::testutil::workdir;

    #[test]
    fn builtin_catalog() {
        let scenarios = builtin_scenarios().unwrap();
        assert_eq!(scenarios.len(), 16);

        let normal = &scenarios[0];
        assert_eq!(normal.title, "Normal Run");
        assert_eq!(normal.faults[0].evttype, "none");
        assert_eq!(normal.faults[0].duration, 10.0);

        assert_eq!(scenarios[3].faults.len(), 3);
        assert_eq!(scenarios[6].state_machines.len(), 3);

        let pdelay = &scenarios[7].faults[0];
        assert_eq!(pdelay.msgtype, "pdreq");
        assert_eq!(pdelay.endrun, 5.0);

        for scenario in &scenarios {
            for fault in &scenario.faults {
                let resolved = fault.resolve().unwrap();
                assert!(MessageType::ALL.contains(&resolved.message_type));
                assert!(EventType::ALL.contains(&resolved.event_type));
            }
        }
    }

    #[test]
    fn selections() {
        assert_eq!(parse_selection("0\n", 16), MenuChoice::Quit);
        assert_eq!(parse_selection("c\n", 16), MenuChoice::ShowComments);
        assert_eq!(parse_selection("comments", 16), MenuChoice::ShowComments);
        assert_eq!(parse_selection("1\n", 16), MenuChoice::Run(0));
        assert_eq!(parse_selection(" 16 ", 16), MenuChoice::Run(15));
        assert_eq!(parse_selection("17", 16), MenuChoice::Invalid);
        assert_eq!(parse_selection("-1", 16), MenuChoice::Invalid);
        assert_eq!(parse_selection("\n", 16), MenuChoice::Invalid);
        assert_eq!(parse_selection("x", 16), MenuChoice::Invalid);
    }

    fn two_scenarios() -> Vec<Scenario> {
        builtin_scenarios().unwrap().into_iter().take(2).collect()
    }

    #[test]
    fn menu_with_comments() {
        let mut out = Vec::new();
        render_menu(&two_scenarios(), true, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("------------------------------\n1: Normal Run\n    all\n"));
        assert!(text.contains("2: missing Sync\n    md_sync_receive_sm,"));
        assert!(text.contains("    Skip sending Sync from the master side.\n"));
    }

    #[test]
    fn menu_session() {
        let scenarios = two_scenarios();
        let mut input = Cursor::new(b"5\nc\n2\n0\n".to_vec());
        let mut out = Vec::new();
        let mut ran = Vec::new();

        run_menu(&scenarios, &mut input, &mut out, |scenario, _, _| {
            ran.push(scenario.title.clone())
        })
        .unwrap();

        assert_eq!(ran, ["missing Sync"]);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("select from 0 to 2\n"));
        assert_eq!(text.matches("1: Normal Run").count(), 3);
        assert!(text.contains("    all\n"));
    }

    #[test]
    fn menu_ends_with_input() {
        let mut input = Cursor::new(Vec::new());
        let mut out = Vec::new();

        run_menu(&two_scenarios(), &mut input, &mut out, |_, _, _| {
            panic!("nothing was selected")
        })
        .unwrap();

        assert!(String::from_utf8(out).unwrap().ends_with("comment) ?\n"));
    }

    #[test]
    fn scenarios_from_file() {
        let path = workdir("file-scenarios").join("menu.toml");
        std::fs::write(
            &path,
            "[[scenario]]\ntitle = \"extra\"\ncomment = \"two lines\\nof text\"\n\
             [[scenario.fault]]\nmsgtype = \"anno\"\n",
        )
        .unwrap();

        let scenarios = file_scenarios(&path).unwrap();
        assert_eq!(scenarios.len(), 1);
        assert_eq!(scenarios[0].title, "extra");
        assert_eq!(scenarios[0].faults[0].msgtype, "anno");
        assert_eq!(scenarios[0].comment.lines().count(), 2);
    }
}
