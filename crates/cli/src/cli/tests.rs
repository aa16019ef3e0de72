use std::path::PathBuf;

use clap::Parser;
use serde_json::json;

use super::*;

#[test]
fn no_flags_leaves_everything_unset() {
	let cli = Cli::try_parse_from(["jsbridge"]).unwrap();

	assert_eq!(cli.verbose, 0);
	assert_eq!(cli.port, None);
	assert_eq!(cli.host, None);
	assert!(!cli.debug);
	assert!(!cli.shell);
	assert!(!cli.plain);
	assert!(cli.addons.is_empty());
	assert!(cli.prefs.is_empty());
	assert!(cli.args.is_empty());
}

#[test]
fn parse_port_debug_and_shell() {
	let cli = Cli::try_parse_from(["jsbridge", "-P", "4242", "-D", "-s"]).unwrap();

	assert_eq!(cli.port, Some(4242));
	assert!(cli.debug);
	assert!(cli.shell);
}

#[test]
fn usecode_is_an_alias_for_plain() {
	let long = Cli::try_parse_from(["jsbridge", "--usecode"]).unwrap();
	let short = Cli::try_parse_from(["jsbridge", "-u"]).unwrap();
	assert!(long.plain);
	assert!(short.plain);
}

#[test]
fn verbose_flag_counts() {
	let cli = Cli::try_parse_from(["jsbridge", "-vv"]).unwrap();
	assert_eq!(cli.verbose, 2);

	let cli = Cli::try_parse_from(["jsbridge", "--verbose"]).unwrap();
	assert_eq!(cli.verbose, 1);
}

#[test]
fn addons_and_prefs_repeat() {
	let cli = Cli::try_parse_from([
		"jsbridge",
		"--addon",
		"/tmp/a.xpi",
		"--addon",
		"/tmp/b.xpi",
		"--pref",
		"dom.disable_open_during_load=false",
		"--pref",
		"browser.startup.homepage=about:blank",
	])
	.unwrap();

	assert_eq!(
		cli.addons,
		vec![PathBuf::from("/tmp/a.xpi"), PathBuf::from("/tmp/b.xpi")]
	);
	assert_eq!(
		cli.prefs,
		vec![
			("dom.disable_open_during_load".to_string(), json!(false)),
			("browser.startup.homepage".to_string(), json!("about:blank")),
		]
	);
}

#[test]
fn trailing_args_go_to_the_browser() {
	let cli = Cli::try_parse_from(["jsbridge", "-P", "5000", "--", "-new-instance", "about:blank"]).unwrap();
	assert_eq!(cli.port, Some(5000));
	assert_eq!(cli.args, vec!["-new-instance", "about:blank"]);
}

#[test]
fn handshake_bounds() {
	let cli = Cli::try_parse_from(["jsbridge", "--timeout", "10", "--max-attempts", "3"]).unwrap();
	assert_eq!(cli.timeout, Some(10));
	assert_eq!(cli.max_attempts, Some(3));
}

#[test]
fn invalid_port_is_rejected() {
	assert!(Cli::try_parse_from(["jsbridge", "-P", "70000"]).is_err());
	assert!(Cli::try_parse_from(["jsbridge", "-P", "http"]).is_err());
}

#[test]
fn pref_values_parse_as_json_scalars() {
	assert_eq!(parse_pref("a=1").unwrap(), ("a".to_string(), json!(1)));
	assert_eq!(parse_pref("a=true").unwrap(), ("a".to_string(), json!(true)));
	assert_eq!(parse_pref("a=\"1\"").unwrap(), ("a".to_string(), json!("1")));
	assert_eq!(parse_pref("a=x=y").unwrap(), ("a".to_string(), json!("x=y")));
	assert_eq!(parse_pref("a=").unwrap(), ("a".to_string(), json!("")));
}

#[test]
fn malformed_prefs_are_rejected() {
	assert!(parse_pref("novalue").is_err());
	assert!(parse_pref("=1").is_err());
	assert!(parse_pref("a=[1]").unwrap_err().contains("'a'"));
	assert!(parse_pref("a=null").is_err());
	assert!(Cli::try_parse_from(["jsbridge", "--pref", "broken"]).is_err());
}
