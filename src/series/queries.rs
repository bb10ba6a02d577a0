//! Control-plane queries backing the default series.
//!
//! Column aliases here are the contract with the tag mappings in
//! [`SeriesRegistry::openstack_defaults`](super::SeriesRegistry::openstack_defaults).

pub(super) const HYPERVISORS: &str = r#"
SELECT
    id AS hypervisor_id,
    hypervisor_hostname AS hostname,
    host_ip AS ip_address,
    vcpus AS cpus,
    memory_mb AS memory,
    local_gb AS local_storage,
    'NCI' AS node
FROM nova.compute_nodes
"#;

pub(super) const PROJECTS: &str = r#"
SELECT DISTINCT
    p.id AS project_id,
    p.name AS display_name,
    p.enabled AS enabled,
    i.hard_limit AS instances,
    c.hard_limit AS cores,
    r.hard_limit AS ram,
    g.total_limit AS gigabytes,
    v.total_limit AS volumes,
    s.total_limit AS snapshots
FROM keystone.project AS p
LEFT OUTER JOIN (
    SELECT * FROM nova.quotas WHERE deleted = 0 AND resource = 'ram'
) AS r ON p.id = r.project_id
LEFT OUTER JOIN (
    SELECT * FROM nova.quotas WHERE deleted = 0 AND resource = 'instances'
) AS i ON p.id = i.project_id
LEFT OUTER JOIN (
    SELECT * FROM nova.quotas WHERE deleted = 0 AND resource = 'cores'
) AS c ON p.id = c.project_id
LEFT OUTER JOIN (
    SELECT project_id, SUM(IF(hard_limit >= 0, hard_limit, 0)) AS total_limit
    FROM cinder.quotas
    WHERE deleted = 0 AND resource LIKE 'gigabytes%'
    GROUP BY project_id
) AS g ON p.id = g.project_id
LEFT OUTER JOIN (
    SELECT project_id, SUM(IF(hard_limit >= 0, hard_limit, 0)) AS total_limit
    FROM cinder.quotas
    WHERE deleted = 0 AND resource LIKE 'volumes%'
    GROUP BY project_id
) AS v ON p.id = v.project_id
LEFT OUTER JOIN (
    SELECT project_id, SUM(IF(hard_limit >= 0, hard_limit, 0)) AS total_limit
    FROM cinder.quotas
    WHERE deleted = 0 AND resource LIKE 'snapshots%'
    GROUP BY project_id
) AS s ON p.id = s.project_id
"#;

// flavorid is not unique across deleted flavours, but it is the identifier
// every other series refers to.
pub(super) const FLAVOURS: &str = r#"
SELECT
    id AS _flavour_id,
    flavorid AS flavour_id,
    name,
    vcpus,
    memory_mb AS memory,
    root_gb AS root,
    ephemeral_gb AS ephemeral,
    is_public AS public
FROM nova.instance_types
"#;

pub(super) const INSTANCES: &str = r#"
SELECT
    project_id,
    uuid AS instance_id,
    display_name AS name,
    vcpus,
    memory_mb AS memory,
    root_gb AS root,
    ephemeral_gb AS ephemeral,
    instance_type_id AS flavour,
    UNIX_TIMESTAMP(created_at) AS created,
    UNIX_TIMESTAMP(deleted_at) AS deleted,
    UNIX_TIMESTAMP(IFNULL(deleted_at, NOW())) - UNIX_TIMESTAMP(created_at) AS allocation_time,
    0 AS wall_time,
    0 AS cpu_time,
    IF(deleted <> 0, FALSE, TRUE) AS active,
    host AS hypervisor,
    IFNULL(availability_zone, '') AS availability_zone
FROM nova.instances
"#;

pub(super) const VOLUMES: &str = r#"
SELECT
    id AS volume_id,
    project_id,
    display_name,
    size,
    UNIX_TIMESTAMP(created_at) AS created,
    UNIX_TIMESTAMP(deleted_at) AS deleted,
    IF(attach_status = 'attached', TRUE, FALSE) AS attached,
    instance_uuid,
    IFNULL(availability_zone, '') AS availability_zone
FROM cinder.volumes
"#;

pub(super) const IMAGES: &str = r#"
SELECT
    id AS image_id,
    owner AS project_id,
    name,
    size,
    status,
    is_public AS public,
    UNIX_TIMESTAMP(created_at) AS created,
    UNIX_TIMESTAMP(deleted_at) AS deleted
FROM glance.images
"#;
