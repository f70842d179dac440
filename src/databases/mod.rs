// Databases module: the closed set of rehosted databases and their quirks
//
// Everything that differs between databases (where the payload sits inside a
// vendor archive, which hash the vendor publishes, what runtime pieces ride
// along, how to build a missing platform) is answered here by exhaustive
// matches. The pipeline itself is database-agnostic.

use std::fmt;
use std::str::FromStr;

use crate::build::BuildStrategy;
use crate::error::HostdbError;
use crate::extract::PayloadLocator;
use crate::platform::Platform;
use crate::repackage::PayloadPlacement;
use crate::sources::hash::HashAlgorithm;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Database {
    Mysql,
    Mariadb,
    Postgresql,
    Mongodb,
    Redis,
    Sqlite,
    Questdb,
    Ferretdb,
}

/// An auxiliary download whose `bin/` is merged into the database's `bin/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    pub name: &'static str,
    pub locator: PayloadLocator,
}

const MONGODB_COMPONENTS: &[Component] = &[Component {
    name: "mongosh",
    locator: PayloadLocator::Prefix("mongosh-"),
}];

const QUESTDB_COMPONENTS: &[Component] = &[Component {
    name: "jre",
    locator: PayloadLocator::Prefix("jdk"),
}];

impl Database {
    pub const ALL: [Database; 8] = [
        Database::Mysql,
        Database::Mariadb,
        Database::Postgresql,
        Database::Mongodb,
        Database::Redis,
        Database::Sqlite,
        Database::Questdb,
        Database::Ferretdb,
    ];

    /// Identifier used in paths, archive names and metadata.
    pub fn name(&self) -> &'static str {
        match self {
            Database::Mysql => "mysql",
            Database::Mariadb => "mariadb",
            Database::Postgresql => "postgresql",
            Database::Mongodb => "mongodb",
            Database::Redis => "redis",
            Database::Sqlite => "sqlite",
            Database::Questdb => "questdb",
            Database::Ferretdb => "ferretdb",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Database::Mysql => "MySQL",
            Database::Mariadb => "MariaDB",
            Database::Postgresql => "PostgreSQL",
            Database::Mongodb => "MongoDB",
            Database::Redis => "Redis",
            Database::Sqlite => "SQLite",
            Database::Questdb => "QuestDB",
            Database::Ferretdb => "FerretDB",
        }
    }

    /// The digest the vendor publishes for its downloads.
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        match self {
            Database::Sqlite => HashAlgorithm::Sha3_256,
            Database::Mysql
            | Database::Mariadb
            | Database::Postgresql
            | Database::Mongodb
            | Database::Redis
            | Database::Questdb
            | Database::Ferretdb => HashAlgorithm::Sha256,
        }
    }

    /// Where the payload directory sits inside an extracted vendor download.
    pub fn payload_locator(&self, platform: Platform) -> PayloadLocator {
        match (self, platform) {
            (Database::Mysql, _) => PayloadLocator::Prefix("mysql-"),
            // Windows ships an MSI; an administrative install lands in "MariaDB 11.4/"
            (Database::Mariadb, Platform::Win32X64) => PayloadLocator::Prefix("mariadb"),
            (Database::Mariadb, _) => PayloadLocator::Prefix("mariadb-"),
            (Database::Postgresql, Platform::Win32X64) => PayloadLocator::Prefix("pgsql"),
            (Database::Postgresql, _) => PayloadLocator::Root,
            (Database::Mongodb, _) => PayloadLocator::Prefix("mongodb-"),
            (Database::Redis, _) => PayloadLocator::Root,
            (Database::Sqlite, _) => PayloadLocator::Root,
            (Database::Questdb, _) => PayloadLocator::Suffix("-bin"),
            (Database::Ferretdb, _) => PayloadLocator::Root,
        }
    }

    pub fn placement(&self) -> PayloadPlacement {
        match self {
            Database::Sqlite | Database::Redis => PayloadPlacement::BinOnly,
            Database::Mysql
            | Database::Mariadb
            | Database::Postgresql
            | Database::Mongodb
            | Database::Questdb
            | Database::Ferretdb => PayloadPlacement::Tree,
        }
    }

    /// Runtime pieces bundled next to the server binaries.
    pub fn components(&self) -> &'static [Component] {
        match self {
            Database::Mongodb => MONGODB_COMPONENTS,
            Database::Questdb => QUESTDB_COMPONENTS,
            Database::Mysql
            | Database::Mariadb
            | Database::Postgresql
            | Database::Redis
            | Database::Sqlite
            | Database::Ferretdb => &[],
        }
    }

    /// How a platform without a prebuilt binary can still be produced.
    pub fn build_strategy(&self) -> Option<BuildStrategy> {
        match self {
            Database::Redis | Database::Postgresql | Database::Mariadb | Database::Sqlite => {
                Some(BuildStrategy::DockerScript)
            }
            Database::Ferretdb => Some(BuildStrategy::GoCross {
                repository: "https://github.com/FerretDB/FerretDB.git",
                package: "./cmd/ferretdb",
                binary: "ferretdb",
            }),
            Database::Mysql | Database::Mongodb | Database::Questdb => None,
        }
    }

    pub fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(|d| d.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Database {
    type Err = HostdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.name() == s)
            .ok_or_else(|| {
                HostdbError::InvalidArgument(format!(
                    "unknown database '{}'. Supported databases: {}",
                    s,
                    Self::supported_list()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for db in Database::ALL {
            assert_eq!(db.name().parse::<Database>().unwrap(), db);
        }
        assert!("MySQL".parse::<Database>().is_err());
        assert!("oracle".parse::<Database>().is_err());
    }

    #[test]
    fn test_sqlite_uses_sha3() {
        assert_eq!(Database::Sqlite.hash_algorithm(), HashAlgorithm::Sha3_256);
        assert_eq!(Database::Mysql.hash_algorithm(), HashAlgorithm::Sha256);
    }

    #[test]
    fn test_bundled_components() {
        assert_eq!(Database::Mongodb.components()[0].name, "mongosh");
        assert_eq!(Database::Questdb.components()[0].name, "jre");
        assert!(Database::Redis.components().is_empty());
    }

    #[test]
    fn test_go_builder_for_ferretdb() {
        match Database::Ferretdb.build_strategy() {
            Some(BuildStrategy::GoCross { binary, .. }) => assert_eq!(binary, "ferretdb"),
            other => panic!("unexpected strategy {:?}", other),
        }
        assert!(Database::Mysql.build_strategy().is_none());
    }
}
