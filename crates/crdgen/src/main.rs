use kube::CustomResourceExt as _;
use replication_group::api::v1::replicationgroup::ReplicationGroup;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&ReplicationGroup::crd())?);
    Ok(())
}
