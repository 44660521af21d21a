use crate::CLAP_STYLING;
use clap::{ArgAction, arg, command};
use std::path::PathBuf;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("phishguard")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("phishguard")
        .about("Signed, cache-first phishing verdicts for URLs")
        .styles(CLAP_STYLING)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            arg!(-c --"config" <PATH>)
                .required(false)
                .global(true)
                .help("JSON configuration file")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            arg!(--"cache" <PATH>)
                .required(false)
                .global(true)
                .help("Enrichment cache file (default: feature_cache.json)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            arg!(--"private-key" <PATH>)
                .required(false)
                .global(true)
                .help("RSA private key (PKCS#8 or PKCS#1 PEM)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            arg!(--"public-key" <PATH>)
                .required(false)
                .global(true)
                .help("RSA public key (SPKI PEM); must match the private key")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            arg!(--"hmac-secret" <SECRET>)
                .required(false)
                .global(true)
                .help("Shared HMAC secret, base64 or hex"),
        )
        .subcommand(
            command!("check")
                .about("Score a URL and print the signed verdict")
                .arg(arg!(<URL>).required(true).help("The URL to check"))
                .arg(
                    arg!(--"model" <PATH>)
                        .required(false)
                        .help("Logistic model exported as JSON")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-m --"mode" <MODE>)
                        .required(false)
                        .help("Network mode for enrichment lookups")
                        .value_parser(["cache-first", "fetch", "cache-only"]),
                )
                .arg(
                    arg!(--"json")
                        .required(false)
                        .help("Print only the signed verdict as JSON")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Also save the signed verdict to a file")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--"disable-dom")
                        .required(false)
                        .help("Neutralise the DOM features")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"disable-ct")
                        .required(false)
                        .help("Neutralise the certificate-transparency flag")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"disable-whois")
                        .required(false)
                        .help("Neutralise the domain-age feature")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"url-only")
                        .required(false)
                        .help("Score on lexical features alone")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"no-reputation")
                        .required(false)
                        .help("Do not cap scores for well-known domains")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("warm")
                .about("Pre-populate the enrichment cache for well-known and listed URLs")
                .arg(
                    arg!(-a --"add" <URL>)
                        .required(false)
                        .help("Additional URLs to warm")
                        .num_args(1..)
                        .action(ArgAction::Append),
                )
                .arg(
                    arg!(-f --"file" <PATH>)
                        .required(false)
                        .help("Path to a newline-delimited file of URLs to warm")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-t --"threads" <NUM_WORKERS>)
                        .required(false)
                        .help("The number of concurrent lookups")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("8"),
                ),
        )
        .subcommand(
            command!("verify")
                .about("Verify a saved signed verdict")
                .arg(
                    arg!(-b --"bundle" <PATH>)
                        .required(true)
                        .help("Signed verdict JSON as written by `check --output`")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--"pubkey" <PATH>)
                        .required(false)
                        .help("Trusted public key to check against instead of the embedded one")
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            command!("pubkey")
                .about("Print the PEM public key used to sign verdicts")
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Write the key to a file instead of stdout")
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            command!("keygen")
                .about("Generate an RSA key pair and a shared HMAC secret")
                .arg(
                    arg!(-o --"out" <DIR>)
                        .required(false)
                        .help("Directory for rsa_private.pem and rsa_public.pem")
                        .value_parser(clap::value_parser!(PathBuf))
                        .default_value("."),
                )
                .arg(
                    arg!(--"bits" <BITS>)
                        .required(false)
                        .help("RSA modulus size")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("2048"),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_definition_is_valid() {
        command_argument_builder().debug_assert();
    }

    #[test]
    fn test_global_args_reach_subcommands() {
        let matches = command_argument_builder()
            .try_get_matches_from([
                "phishguard",
                "check",
                "http://example.com",
                "--cache",
                "/tmp/cache.json",
                "--mode",
                "cache-only",
                "--url-only",
            ])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "check");
        assert_eq!(
            sub.get_one::<PathBuf>("cache"),
            Some(&PathBuf::from("/tmp/cache.json"))
        );
        assert_eq!(sub.get_one::<String>("mode").map(String::as_str), Some("cache-only"));
        assert!(sub.get_flag("url-only"));
    }

    #[test]
    fn test_warm_accepts_repeated_urls() {
        let matches = command_argument_builder()
            .try_get_matches_from(["phishguard", "warm", "--add", "a.com", "b.com", "--add", "c.com"])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        let added: Vec<&String> = sub.get_many::<String>("add").unwrap().collect();
        assert_eq!(added.len(), 3);
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let result = command_argument_builder().try_get_matches_from([
            "phishguard",
            "check",
            "http://example.com",
            "--mode",
            "offline",
        ]);
        assert!(result.is_err());
    }
}
