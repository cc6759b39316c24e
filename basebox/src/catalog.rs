//! The default provisioning plan.
//!
//! Every entry is a [`Step`]: probes deciding whether the host is already
//! set up, plus what to do on each branch. Order matters; later steps rely on
//! tools installed by earlier ones (pythonbrew before python, python before
//! virtualenvwrapper, and so on).

use crate::action::Action;
use crate::core::shell;
use crate::core::step::{Op, Probe, Step};
use crate::core::types::FastInstaller;
use crate::io::config::ProvisionConfig;

/// Installed on every run; `apt` skips what is already present.
pub const BASE_PACKAGES: &[&str] = &[
    "unattended-upgrades",
    "build-essential",
    "libssl-dev",
    "libexpat1-dev",
    "pkg-config",
    "git-core",
    "git-flow",
    "curl",
    "vim",
    // python build dependencies
    "libjpeg-dev",
    "libsqlite3-dev",
    "libbz2-dev",
    // lxml
    "libxml2-dev",
    "libxslt1-dev",
];

const APT_SOURCES: &str = "/etc/apt/sources.list";
const MONGODB_CONF: &str = "/etc/mongodb.conf";
const MONGODB_REPO: &str = "deb http://downloads-distro.mongodb.org/repo/debian-sysvinit dist 10gen";
/// Present once the `nojournal = true` line has been commented out.
const MONGODB_JOURNAL_ENABLED: &str = r"#\s*nojournal";
const MONGODB_NOJOURNAL_LINE: &str = r"\s*nojournal = true\s*";

/// Steps in dispatch order.
pub fn default_plan(cfg: &ProvisionConfig) -> Vec<Step> {
    let mut plan = Vec::new();
    if cfg.fast_installer != FastInstaller::Disabled {
        plan.push(apt_fast());
    }
    plan.extend([
        packages(),
        pythonbrew(cfg),
        python(cfg),
        virtualenvwrapper(cfg),
        virtualenv(),
        nodejs(),
        bundler(),
        mongodb(),
        redis(),
        cleanup(cfg),
    ]);
    plan
}

/// [`default_plan`] ready for the sequencer.
pub fn default_actions(cfg: &ProvisionConfig) -> Vec<Box<dyn Action>> {
    default_plan(cfg)
        .into_iter()
        .map(|step| Box::new(step) as Box<dyn Action>)
        .collect()
}

/// apt-fast is not installed yet on this branch, so the bootstrap always
/// goes through apt-get whatever the fast-installer setting says.
fn apt_fast() -> Step {
    let apt_get_install = |package: &str| Op::sudo(shell::apt_install("apt-get", &[package]));
    Step::new("apt-fast")
        .probe(Probe::which("apt-fast"))
        .on_run(Op::sudo(shell::apt_update("apt-fast")))
        .on_fail(Op::sudo(shell::apt_update("apt-get")))
        .on_fail(apt_get_install("python-software-properties"))
        .on_fail(Op::sudo(shell::add_apt_repository("ppa:apt-fast/stable")))
        .on_fail(Op::sudo(shell::apt_update("apt-get")))
        .on_fail(apt_get_install("axel"))
        .on_fail(apt_get_install("apt-fast"))
        .on_fail(Op::ResetFastInstaller)
}

fn packages() -> Step {
    Step::new("packages").on_run(Op::install(BASE_PACKAGES))
}

fn pythonbrew(cfg: &ProvisionConfig) -> Step {
    Step::new("pythonbrew")
        .probe(Probe::which("pythonbrew"))
        .on_fail(Op::RunDownloaded {
            url: cfg.pythonbrew_url.clone(),
            sudo: true,
        })
}

fn python(cfg: &ProvisionConfig) -> Step {
    let version = shell::quote(&cfg.python_version);
    let profile = cfg.profile_path();
    let path_line = format!("PATH=\"{}:$PATH\"", cfg.python_bin());
    Step::new("python")
        .probe(Probe::Succeeds {
            command: format!("pythonbrew list | grep {version}"),
            sudo: true,
        })
        .probe(Probe::contains(&profile, &path_line))
        // a fresh host has nothing to uninstall
        .on_fail(Op::TrySudo(format!("pythonbrew uninstall {version}")))
        .on_fail(Op::sudo(format!("pythonbrew install -f {version}")))
        .on_fail(Op::sudo(format!("pythonbrew switch {version}")))
        .on_fail(Op::Append {
            path: profile,
            text: path_line,
            sudo: false,
        })
}

fn virtualenvwrapper(cfg: &ProvisionConfig) -> Step {
    let bin = cfg.python_bin();
    let profile = cfg.profile_path();
    let block = [
        "export WORKON_HOME=$HOME/VirtualEnvs".to_string(),
        "export PROJECT_HOME=$HOME/Dropbox/Projects".to_string(),
        format!("export VIRTUALENVWRAPPER_PYTHON={}", cfg.python()),
        "# Do not run virtualenvwrapper if logged in as another user".to_string(),
        "if [ $USER == \"vagrant\" ]; then".to_string(),
        format!("  source {bin}/virtualenvwrapper.sh"),
        "fi".to_string(),
    ]
    .join("\n");
    Step::new("virtualenvwrapper")
        .probe(Probe::exists(format!("{bin}/virtualenvwrapper.sh")))
        .probe(Probe::contains(&profile, "WORKON_HOME"))
        .on_fail(Op::sudo(format!(
            "{} install virtualenvwrapper",
            shell::quote(&cfg.pip())
        )))
        .on_fail(Op::Append {
            path: profile,
            text: block,
            sudo: false,
        })
}

fn virtualenv() -> Step {
    Step::new("virtualenv")
        .probe(Probe::exists("$WORKON_HOME/python"))
        .on_fail(Op::run(
            "mkvirtualenv --distribute --python \"$VIRTUALENVWRAPPER_PYTHON\" python",
        ))
}

fn nodejs() -> Step {
    Step::new("node.js")
        .probe(Probe::which("node"))
        .on_fail(Op::AddAptRepository("ppa:chris-lea/node.js".to_string()))
        .on_fail(Op::install(&["nodejs", "npm"]))
}

fn bundler() -> Step {
    Step::new("bundler")
        .probe(Probe::which("bundle"))
        .on_fail(Op::sudo("gem install bundler"))
}

fn mongodb() -> Step {
    let journal_enabled = Probe::Matches {
        path: MONGODB_CONF.to_string(),
        pattern: MONGODB_JOURNAL_ENABLED.to_string(),
    };
    Step::new("mongodb")
        .probe(Probe::which("mongo"))
        .probe(journal_enabled.clone())
        .on_fail(Op::Unless {
            probe: Probe::contains(APT_SOURCES, "10gen"),
            then: vec![
                Op::sudo("apt-key adv --keyserver keyserver.ubuntu.com --recv 7F0CEB10"),
                Op::Append {
                    path: APT_SOURCES.to_string(),
                    text: MONGODB_REPO.to_string(),
                    sudo: true,
                },
                Op::AptUpdate,
            ],
        })
        .on_fail(Op::install(&["mongodb20-10gen"]))
        // journaling on: this is a test server, the 2GB limit does not matter
        .on_fail(Op::Unless {
            probe: journal_enabled,
            then: vec![Op::CommentOut {
                path: MONGODB_CONF.to_string(),
                pattern: MONGODB_NOJOURNAL_LINE.to_string(),
            }],
        })
        .on_fail(Op::sudo("/etc/init.d/mongodb restart"))
}

fn redis() -> Step {
    Step::new("redis")
        .probe(Probe::which("redis-server"))
        .on_fail(Op::AddAptRepository(
            "ppa:chris-lea/redis-server".to_string(),
        ))
        .on_fail(Op::install(&["redis-server"]))
}

fn cleanup(cfg: &ProvisionConfig) -> Step {
    Step::new("cleanup")
        .on_run(Op::sudo("apt-get clean"))
        .on_run(Op::run(shell::rm_rf("/tmp/build")))
        .on_run(Op::run(shell::rm_rf(&cfg.remote_cache_root())))
}
