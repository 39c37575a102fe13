/*!
 * Subcommands that do not run the hammer
 */

pub mod init;
